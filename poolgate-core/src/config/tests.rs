#[cfg(test)]
mod tests {
    use crate::config::loader::{load_config_from_path, parse_config};
    use crate::config::model::*;

    fn create_test_config() -> Config {
        Config {
            lb_port: 3030,
            backends: vec![
                "http://localhost:5001".to_string(),
                "http://localhost:5002".to_string(),
            ],
            strategy: LoadBalanceStrategy::RoundRobin,
            max_attempt_limit: 3,
            settings: GlobalSettings::default(),
        }
    }

    #[test]
    fn test_config_validation_success() {
        let config = create_test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_no_backends() {
        let mut config = create_test_config();
        config.backends.clear();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("none provided"));
    }

    #[test]
    fn test_config_validation_missing_port() {
        let mut config = create_test_config();
        config.lb_port = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port not found"));
    }

    #[test]
    fn test_config_validation_malformed_url() {
        let mut config = create_test_config();
        config.backends.push("not a url".to_string());
        assert!(config.validate().is_err());

        // 没有 scheme 时 "localhost" 会被当成 scheme
        let mut config = create_test_config();
        config.backends.push("localhost:5003".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_config_validation_admin_port_collision() {
        let mut config = create_test_config();
        config.settings.admin_port = Some(config.lb_port);
        assert!(config.validate().is_err());

        config.settings.admin_port = Some(3031);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeouts() {
        let mut config = create_test_config();
        config.settings.health_check_timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.settings.health_check_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_from_name() {
        assert_eq!(
            LoadBalanceStrategy::from_name("least-connected"),
            LoadBalanceStrategy::LeastConnected
        );
        assert_eq!(
            LoadBalanceStrategy::from_name("round-robin"),
            LoadBalanceStrategy::RoundRobin
        );
        // 未知策略回退到轮询
        assert_eq!(
            LoadBalanceStrategy::from_name("weighted"),
            LoadBalanceStrategy::RoundRobin
        );
    }

    #[test]
    fn test_parse_config_with_defaults() {
        let config = parse_config(
            r#"
lb_port = 8080
backends = ["http://127.0.0.1:9001", "https://example.com/api"]
"#,
        )
        .unwrap();

        assert_eq!(config.lb_port, 8080);
        assert_eq!(config.strategy, LoadBalanceStrategy::RoundRobin);
        assert_eq!(config.max_attempt_limit, 3);
        assert_eq!(config.settings.health_check_interval_seconds, 20);
        assert_eq!(config.settings.health_check_timeout_seconds, 10);
        assert_eq!(config.settings.admin_port, None);

        let urls = config.backend_urls().unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1].path(), "/api");
    }

    #[test]
    fn test_parse_config_least_connected() {
        let config = parse_config(
            r#"
lb_port = 8080
strategy = "least-connected"
backends = ["http://127.0.0.1:9001"]

[settings]
health_check_interval_seconds = 5
admin_port = 8081
"#,
        )
        .unwrap();

        assert_eq!(config.strategy, LoadBalanceStrategy::LeastConnected);
        assert_eq!(config.settings.health_check_interval_seconds, 5);
        assert_eq!(config.settings.admin_port, Some(8081));
    }

    #[test]
    fn test_parse_config_rejects_empty_backends() {
        let result = parse_config("lb_port = 8080\nbackends = []\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_strategy_serializes_to_name() {
        let config = create_test_config();
        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains("strategy = \"round-robin\""));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config_from_path("/nonexistent/poolgate.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("poolgate-config-{}.toml", std::process::id()));
        std::fs::write(&path, "lb_port = 4000\nbackends = [\"http://10.0.0.1:80\"]\n").unwrap();

        let config = load_config_from_path(path.to_str().unwrap()).unwrap();
        assert_eq!(config.lb_port, 4000);

        let _ = std::fs::remove_file(&path);
    }
}
