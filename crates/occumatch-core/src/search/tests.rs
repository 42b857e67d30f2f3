//! Unit tests for search module

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::path::Path;
    use std::sync::Arc;

    const CATALOG_CSV: &str = "\
title_Code,title_x,title_y,Division_code,Subdivision_Code,Group_Code,Family_Code,Description,2004_code
2512.0100,Software Developer,Software Developer (old),2,25,251,2512,Designs and writes computer programs.,2131.10
2512.0200,Systems Analyst,Systems Analyst,2,25,251,2512,Analyses business systems and specifies software.,2131.20
7212.0100,Welder,Welder,7,72,721,7212,Joins metal parts by welding.,7212.10
7212.0200,Flame Cutter,Flame Cutter,7,72,721,7212,Cuts metal using gas torches.,7212.20
5120.0100,Cook,Cook,5,51,512,5120,Prepares and cooks food in restaurants.,5122.10
";

    fn config_in(dir: &Path, dimensions: usize) -> SearchConfig {
        let mut config = SearchConfig::default();
        config.embedding.dimensions = dimensions;
        config.embedding.batch_size = 2;
        config.paths = PathsConfig {
            catalog_path: Some(dir.join("catalog.csv")),
            index_path: Some(dir.join("catalog.omvi")),
            index_metadata_path: Some(dir.join("index-metadata.json")),
            history_db_path: Some(dir.join("history.db")),
        };
        config
    }

    async fn open_searcher(config: &SearchConfig) -> (Searcher, IndexStats) {
        let store = RecordStore::load(&config.paths.get_catalog_path(), &config.catalog).unwrap();
        let embedder = HashEmbedder::new(config.embedding.dimensions);
        let (index, stats) = Indexer::new(config, &store, &embedder).open().await.unwrap();
        let searcher = Searcher::new(
            Arc::new(store),
            Arc::new(index),
            Arc::new(embedder),
            (&config.search).into(),
        )
        .unwrap();
        (searcher, stats)
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_search_config_default() {
            let config = SearchConfig::default();
            assert!(config.embedding.dimensions > 0);
            assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
            assert_eq!(config.search.default_top_k, 5);
            assert_eq!(config.search.description_limit, 500);
            assert_eq!(config.search.exact_score, ExactScorePolicy::Similarity);
        }

        #[test]
        fn test_embedding_config_default() {
            let config = EmbeddingConfig::default();
            assert!(!config.model.is_empty());
            assert!(config.dimensions > 0);
            assert!(config.batch_size > 0);
        }

        #[test]
        fn test_searcher_options_follow_config() {
            let behavior = SearchBehaviorConfig {
                query_timeout_ms: 1500,
                default_top_k: 3,
                ..Default::default()
            };
            let options = SearcherOptions::from(&behavior);
            assert_eq!(options.query_timeout, std::time::Duration::from_millis(1500));
            assert_eq!(options.default_top_k, 3);
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_search_error_display() {
            let err = SearchError::IndexCorrupt("test error".to_string());
            let display = format!("{}", err);
            assert!(display.contains("test error"));
        }

        #[test]
        fn test_search_error_from_io() {
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
            let search_err = SearchError::from(io_err);
            let display = format!("{}", search_err);
            assert!(display.contains("file not found"));
        }

        #[test]
        fn test_only_empty_query_is_client_error() {
            assert!(SearchError::EmptyQuery.is_client_error());
            assert!(!SearchError::Embedding("x".into()).is_client_error());
            assert!(!SearchError::Timeout(std::time::Duration::from_secs(1)).is_client_error());
        }
    }

    mod pipeline_tests {
        use super::*;

        #[tokio::test]
        async fn test_csv_to_ranked_matches() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), 128);
            std::fs::write(config.paths.get_catalog_path(), CATALOG_CSV).unwrap();

            let (searcher, stats) = open_searcher(&config).await;
            assert!(stats.rebuilt);
            assert_eq!(stats.record_count, 5);

            let by_code = searcher.search_outcome("7212.0100", 5).await.unwrap();
            assert_eq!(by_code.tier, MatchTier::Code);
            assert_eq!(by_code.top_code(), Some("7212.0100"));

            let by_title = searcher.search_outcome("cook", 5).await.unwrap();
            assert_eq!(by_title.tier, MatchTier::Title);
            assert_eq!(by_title.count, 1);

            let by_group = searcher.search_outcome("721", 5).await.unwrap();
            assert_eq!(by_group.tier, MatchTier::Hierarchy);
            assert_eq!(by_group.count, 2);

            let by_meaning = searcher
                .search_outcome("computer programs developer", 2)
                .await
                .unwrap();
            assert_eq!(by_meaning.tier, MatchTier::Vector);
            assert_eq!(by_meaning.count, 2);
            assert_eq!(by_meaning.top_code(), Some("2512.0100"));
        }

        #[tokio::test]
        async fn test_dropped_column_does_not_reach_searchable_text() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), 64);
            std::fs::write(config.paths.get_catalog_path(), CATALOG_CSV).unwrap();

            let store =
                RecordStore::load(&config.paths.get_catalog_path(), &config.catalog).unwrap();
            let first = store.get(0).unwrap();
            assert!(!first.searchable_text().contains("(old)"));
            assert_eq!(first.legacy_code(), Some("2131.10"));
        }

        #[tokio::test]
        async fn test_second_open_reuses_persisted_index() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), 64);
            std::fs::write(config.paths.get_catalog_path(), CATALOG_CSV).unwrap();

            let (first, stats) = open_searcher(&config).await;
            assert!(stats.rebuilt);
            let before = first.search("metal torches", 3).await.unwrap();

            let (second, stats) = open_searcher(&config).await;
            assert!(!stats.rebuilt);
            let after = second.search("metal torches", 3).await.unwrap();
            assert_eq!(before, after);

            let recorded = read_stats(&config).unwrap().unwrap();
            assert_eq!(recorded.record_count, 5);
        }

        #[tokio::test]
        async fn test_edited_catalog_forces_rebuild() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), 64);
            std::fs::write(config.paths.get_catalog_path(), CATALOG_CSV).unwrap();
            let (_, stats) = open_searcher(&config).await;
            assert!(stats.rebuilt);

            let edited = format!(
                "{CATALOG_CSV}9111.0100,Cleaner,Cleaner,9,91,911,9111,Cleans offices.,9132.10\n"
            );
            std::fs::write(config.paths.get_catalog_path(), edited).unwrap();

            let (searcher, stats) = open_searcher(&config).await;
            assert!(stats.rebuilt);
            assert_eq!(stats.record_count, 6);
            let results = searcher.search("9111.0100", 5).await.unwrap();
            assert_eq!(results[0].title, "Cleaner");
        }

        #[tokio::test]
        async fn test_top_k_zero_yields_no_vector_results() {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), 64);
            std::fs::write(config.paths.get_catalog_path(), CATALOG_CSV).unwrap();
            let (searcher, _) = open_searcher(&config).await;

            let results = searcher.search("kitchen work", 0).await.unwrap();
            assert!(results.is_empty());
            // exact tiers ignore top_k
            let results = searcher.search("2", 0).await.unwrap();
            assert_eq!(results.len(), 2);
        }
    }
}
