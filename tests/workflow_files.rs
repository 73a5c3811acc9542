//! Configuration, mint list and cluster metadata loaded from disk

#[cfg(test)]
mod tests {
    use spore_forge::config::{Config, StepLogBackend};
    use spore_forge::workflow::{load_cluster_spec, MintList};
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
        network = "testnet"

        [rpc]
        node_url = "http://127.0.0.1:8114"
        indexer_url = "http://127.0.0.1:8116"

        [signer]
        url = "http://127.0.0.1:9000"
        address = "ckt1qzda0cr08m85hc8jlnfp3zer7xulejywt49kt2rr0vthywaa50xwsqfkcv576ccddnn4quf2ga65xee2m26h7nq4sds0r"

        [workflow]
        step_log = "sled"
        batch_size = 2
        reference_height = 840000
    "#;

    #[test]
    fn test_config_file_loads_and_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, CONFIG).unwrap();

        let config = Config::from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.rpc.indexer_url(), "http://127.0.0.1:8116");
        assert_eq!(config.workflow.step_log, StepLogBackend::Sled);
        assert_eq!(config.workflow.batch_size, 2);
        assert_eq!(config.workflow.reference_height, 840_000);
        assert!(config.step_log_dir().ends_with("testnet"));
    }

    #[test]
    fn test_missing_required_section_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[rpc]\nnode_url = \"http://127.0.0.1:8114\"\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_mint_list_batches_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mint_list.json");
        fs::write(
            &path,
            r#"[{"address":"ckt1a","token_id":1},{"address":"ckt1b","token_id":2},{"address":"ckt1c","token_id":3}]"#,
        )
        .unwrap();

        let list = MintList::load(&path, 2).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.batch_count(), 2);
        assert_eq!(list.batch(2).unwrap()[0].address, "ckt1c");
    }

    #[test]
    fn test_cluster_spec_from_data_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("cluster-3.json"),
            r#"{"name":"Lanterns","description":{"description":"third drop"}}"#,
        )
        .unwrap();

        let spec = load_cluster_spec(dir.path(), 3).unwrap();
        assert_eq!(spec.name, "Lanterns");
        assert_eq!(spec.description_text().unwrap(), r#"{"description":"third drop"}"#);
        assert!(load_cluster_spec(dir.path(), 4).is_err());
    }
}
