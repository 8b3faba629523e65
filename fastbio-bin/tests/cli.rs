#[cfg(test)]
mod cli {
    use std::{error::Error, fs, path::Path, time::Duration};

    use assert_cmd::{Command, cargo::cargo_bin_cmd};
    use http::StatusCode;
    use predicates::str::contains;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tempfile::tempdir;
    use test_utils::{mock_route, mock_server};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string, method, path},
    };

    type Result<T> = std::result::Result<T, Box<dyn Error>>;

    /// The binary with its cache in `cache_dir`
    fn main_command(cache_dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!();
        cmd.env_remove("RUST_LOG")
            .arg("--cache-dir")
            .arg(cache_dir);
        cmd
    }

    fn ok(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(StatusCode::OK).set_body_string(body)
    }

    #[tokio::test]
    async fn test_get_prints_payloads_in_order() -> Result<()> {
        let server = MockServer::start().await;
        mock_route!(
            server,
            "GET",
            "/gene/1017",
            ok("CDK2").set_delay(Duration::from_millis(200))
        );
        mock_route!(server, "GET", "/gene/1018", ok("CDK3"));
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg("--base-url")
            .arg(server.uri())
            .arg("/gene/1017")
            .arg("gene/1018")
            .assert()
            .success()
            .stdout("CDK2\nCDK3\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() -> Result<()> {
        let server = MockServer::start().await;
        mock_route!(server, "GET", "/info/ping", ok("pong"), expect = 1);
        mock_route!(
            server,
            "GET",
            "/missing",
            ResponseTemplate::new(StatusCode::NOT_FOUND),
            expect = 1
        );
        let cache = tempdir()?;
        let urls = [
            format!("{}/info/ping", server.uri()),
            format!("{}/missing", server.uri()),
        ];

        for _ in 0..2 {
            main_command(cache.path())
                .arg("get")
                .args(&urls)
                .assert()
                .success()
                .stdout("pong\n");
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_no_cache_and_refresh_reach_the_network() -> Result<()> {
        let server = MockServer::start().await;
        mock_route!(server, "GET", "/", ok("fresh"), expect = 3);
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg(server.uri())
            .assert()
            .success();
        main_command(cache.path())
            .arg("get")
            .arg("--refresh")
            .arg(server.uri())
            .assert()
            .success();
        main_command(cache.path())
            .arg("--no-cache")
            .arg("get")
            .arg(server.uri())
            .assert()
            .success()
            .stdout("fresh\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_exit_code() -> Result<()> {
        let server = MockServer::start().await;
        mock_route!(server, "GET", "/ok", ok("fine"));
        mock_route!(
            server,
            "GET",
            "/broken",
            ResponseTemplate::new(StatusCode::INTERNAL_SERVER_ERROR)
        );
        mock_route!(server, "GET", "/ok2", ok("also fine"));
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg("--base-url")
            .arg(server.uri())
            .args(["/ok", "/broken", "/ok2"])
            .assert()
            .failure()
            .code(2)
            .stdout("fine\nalso fine\n")
            .stderr(contains("[1]"))
            .stderr(contains("/broken"))
            .stderr(contains("1 of 3 requests failed"));

        Ok(())
    }

    #[tokio::test]
    async fn test_connect_error_is_a_partial_failure() -> Result<()> {
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg("http://127.0.0.1:9/unreachable")
            .assert()
            .failure()
            .code(2)
            .stderr(contains("127.0.0.1:9/unreachable"));

        Ok(())
    }

    #[tokio::test]
    async fn test_json_output() -> Result<()> {
        let server = MockServer::start().await;
        mock_route!(server, "GET", "/json", ok(r#"{"symbol":"CDK2"}"#));
        mock_route!(server, "GET", "/text", ok("hsa:1017"));
        mock_route!(
            server,
            "GET",
            "/missing",
            ResponseTemplate::new(StatusCode::NOT_FOUND)
        );
        mock_route!(
            server,
            "GET",
            "/teapot",
            ResponseTemplate::new(StatusCode::IM_A_TEAPOT)
        );
        let cache = tempdir()?;

        let output = main_command(cache.path())
            .arg("get")
            .arg("--format")
            .arg("json")
            .arg("--base-url")
            .arg(server.uri())
            .args(["/json", "/text", "/missing", "/teapot"])
            .output()?;
        assert_eq!(output.status.code(), Some(2));

        let report: Value = serde_json::from_slice(&output.stdout)?;
        let results = report["results"].as_array().unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0]["index"], 0);
        assert_eq!(results[0]["method"], "GET");
        assert_eq!(results[0]["payload"]["symbol"], "CDK2");
        assert_eq!(results[1]["payload"], "hsa:1017");
        assert_eq!(results[2]["payload"], Value::Null);
        assert!(results[3]["error"].as_str().unwrap().contains("418"));
        assert!(results[3].get("payload").is_none());

        assert_eq!(report["stats"]["network_requests"], 4);
        assert_eq!(report["stats"]["not_found"], 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_post_sends_one_request_per_body() -> Result<()> {
        let server = MockServer::start().await;
        for (query, answer) in [("q=cdk2", "1017"), ("q=tp53", "7157"), ("q=brca1", "672")] {
            Mock::given(method("POST"))
                .and(path("/v3/query"))
                .and(body_string(query))
                .respond_with(ok(answer))
                .expect(1)
                .mount(&server)
                .await;
        }
        let cache = tempdir()?;
        let body_file = cache.path().join("query.txt");
        fs::write(&body_file, "q=brca1")?;

        main_command(cache.path())
            .arg("post")
            .arg(format!("{}/v3/query", server.uri()))
            .args(["--body", "q=cdk2", "--body", "q=tp53"])
            .arg("--body-file")
            .arg(&body_file)
            .assert()
            .success()
            .stdout("1017\n7157\n672\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_headers_are_sent() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wiremock::matchers::header("accept", "application/json"))
            .respond_with(ok("{}"))
            .expect(1)
            .mount(&server)
            .await;
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg(server.uri())
            .arg("-H")
            .arg("Accept: application/json")
            .assert()
            .success();

        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limit_is_applied() -> Result<()> {
        let server = mock_server!(StatusCode::OK, set_body_string("x"));
        let cache = tempdir()?;
        let urls: Vec<String> = (0..5).map(|i| format!("{}/{i}", server.uri())).collect();

        let start = std::time::Instant::now();
        main_command(cache.path())
            .arg("get")
            .arg("--rps")
            .arg("2")
            .args(&urls)
            .assert()
            .success();
        assert!(start.elapsed() >= Duration::from_secs(2));

        Ok(())
    }

    #[tokio::test]
    async fn test_retry_empty_bypasses_the_cache() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok(""))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ok("late data"))
            .mount(&server)
            .await;
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg(server.uri())
            .args(["--retry-empty", "2", "--retry-wait", "10ms"])
            .assert()
            .success()
            .stdout("late data\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_config_file() -> Result<()> {
        let server = MockServer::start().await;
        mock_route!(server, "GET", "/v3/gene/1017", ok("CDK2"), expect = 1);
        let cache = tempdir()?;
        let config = cache.path().join("fastbio.toml");
        fs::write(
            &config,
            format!(
                "base_url = \"{}/v3\"\nrequests_per_second = 3\n\n[header]\nAccept = \"text/plain\"\n",
                server.uri()
            ),
        )?;

        main_command(cache.path())
            .arg("--config")
            .arg(&config)
            .arg("get")
            .arg("/gene/1017")
            .assert()
            .success()
            .stdout("CDK2\n");

        Ok(())
    }

    #[test]
    fn test_invalid_config_file() -> Result<()> {
        let cache = tempdir()?;
        let config = cache.path().join("fastbio.toml");
        fs::write(&config, "requests_per_minute = 3")?;

        main_command(cache.path())
            .arg("--config")
            .arg(&config)
            .arg("cache")
            .arg("path")
            .assert()
            .failure()
            .code(3)
            .stderr(contains("Cannot load configuration file"));

        Ok(())
    }

    #[test]
    fn test_missing_config_file() -> Result<()> {
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("--config")
            .arg(cache.path().join("does-not-exist.toml"))
            .arg("cache")
            .arg("path")
            .assert()
            .failure()
            .code(3);

        Ok(())
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() -> Result<()> {
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg("--rps")
            .arg("0")
            .arg("https://example.com")
            .assert()
            .failure()
            .code(1)
            .stderr(contains("Invalid client configuration"));

        Ok(())
    }

    #[tokio::test]
    async fn test_huge_rate_limit_is_accepted() -> Result<()> {
        let server = mock_server!(StatusCode::OK, set_body_string("fast"));
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg("--rps")
            .arg("4000000000")
            .arg(server.uri())
            .assert()
            .success()
            .stdout("fast\n");

        Ok(())
    }

    #[test]
    fn test_relative_url_without_base_url() -> Result<()> {
        let cache = tempdir()?;

        main_command(cache.path())
            .arg("get")
            .arg("gene/1017")
            .assert()
            .failure()
            .code(1)
            .stderr(contains("gene/1017"));

        Ok(())
    }

    #[tokio::test]
    async fn test_cache_path_and_clear() -> Result<()> {
        let server = mock_server!(StatusCode::OK, set_body_string("cached"));
        let cache = tempdir()?;

        main_command(cache.path())
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(format!("{}\n", cache.path().display()));

        main_command(cache.path())
            .arg("get")
            .arg(format!("{}/a", server.uri()))
            .arg(format!("{}/b", server.uri()))
            .assert()
            .success();

        main_command(cache.path())
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout("2\n");

        main_command(cache.path())
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout("0\n");

        Ok(())
    }
}
