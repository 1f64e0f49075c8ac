//! Control-port client tests against a scripted mock Tor.

use onionwire_core::control::{reconcile, ControlPortClient, ControlPortConfig, ControlProbe};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

type Script = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Serve every connection with `script`, recording each command received.
async fn mock_control_port(script: Script) -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let log = Arc::new(Mutex::new(Vec::new()));

    let seen = log.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let script = script.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    seen.lock().expect("log").push(line.clone());
                    let reply = script(&line);
                    if write_half.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    (port, log)
}

fn client(port: u16) -> ControlPortClient {
    ControlPortClient::new(ControlPortConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_secs(2),
    })
}

const PROTOCOLINFO_NULL: &str =
    "250-PROTOCOLINFO 1\r\n250-AUTH METHODS=NULL\r\n250-VERSION Tor=\"0.4.8.9\"\r\n250 OK\r\n";

fn null_auth_tor(getinfo: fn(&str) -> String) -> Script {
    Arc::new(move |line: &str| match line {
        "PROTOCOLINFO 1" => PROTOCOLINFO_NULL.to_string(),
        "AUTHENTICATE" => "250 OK\r\n".to_string(),
        other => match other.strip_prefix("GETINFO ") {
            Some(key) => getinfo(key),
            None => "510 Unrecognized command\r\n".to_string(),
        },
    })
}

fn standard_getinfo(key: &str) -> String {
    match key {
        "version" => "250-version=0.4.8.9\r\n250 OK\r\n".to_string(),
        "onions/detached" => format!("552 Unrecognized key \"{}\"\r\n", key),
        "onions/current" => {
            "250+onions/current=\r\nAAAA\r\nbbbb.onion\r\naaaa\r\n.\r\n250 OK\r\n".to_string()
        }
        other => format!("552 Unrecognized key \"{}\"\r\n", other),
    }
}

#[tokio::test]
async fn test_protocol_info_reachable() {
    let (port, log) = mock_control_port(null_auth_tor(standard_getinfo)).await;

    match client(port).protocol_info().await {
        ControlProbe::Reachable { protocolinfo } => {
            assert!(protocolinfo.contains("METHODS=NULL"));
            assert!(protocolinfo.contains("250 OK"));
        }
        other => panic!("expected reachable, got {:?}", other),
    }
    assert_eq!(log.lock().expect("log").as_slice(), ["PROTOCOLINFO 1"]);
}

#[tokio::test]
async fn test_protocol_info_unreachable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let probe = client(port).protocol_info().await;
    assert!(!probe.is_ok());
    assert!(matches!(probe, ControlProbe::Unreachable { .. }));
}

#[tokio::test]
async fn test_get_info_maps_unrecognized_to_none() {
    let (port, log) = mock_control_port(null_auth_tor(standard_getinfo)).await;

    let info = client(port)
        .get_info(&["version", "bogus/key"])
        .await
        .expect("get_info");

    assert_eq!(info.get("version").cloned().flatten().as_deref(), Some("0.4.8.9"));
    assert_eq!(info.get("bogus/key"), Some(&None));
    assert_eq!(
        log.lock().expect("log").as_slice(),
        ["PROTOCOLINFO 1", "AUTHENTICATE", "GETINFO version", "GETINFO bogus/key"]
    );
}

#[tokio::test]
async fn test_cookie_authentication() {
    let cookie: Vec<u8> = (0u8..32).collect();
    let path = std::env::temp_dir().join(format!("onionwire-cookie-{}", std::process::id()));
    std::fs::write(&path, &cookie).expect("write cookie");

    let protocolinfo = format!(
        "250-PROTOCOLINFO 1\r\n250-AUTH METHODS=COOKIE,SAFECOOKIE COOKIEFILE=\"{}\"\r\n250 OK\r\n",
        path.display()
    );
    let expected_auth = format!("AUTHENTICATE {}", hex::encode(&cookie));
    let script: Script = Arc::new(move |line: &str| {
        if line == "PROTOCOLINFO 1" {
            protocolinfo.clone()
        } else if line.starts_with("AUTHENTICATE") {
            if line == expected_auth {
                "250 OK\r\n".to_string()
            } else {
                "515 Authentication failed\r\n".to_string()
            }
        } else {
            standard_getinfo(line.trim_start_matches("GETINFO "))
        }
    });
    let (port, _log) = mock_control_port(script).await;

    let info = client(port).get_info(&["version"]).await;
    let _ = std::fs::remove_file(&path);

    let info = info.expect("cookie auth accepted");
    assert_eq!(info.get("version").cloned().flatten().as_deref(), Some("0.4.8.9"));
}

#[tokio::test]
async fn test_authentication_rejected() {
    let script: Script = Arc::new(|line: &str| match line {
        "PROTOCOLINFO 1" => PROTOCOLINFO_NULL.to_string(),
        _ => "515 Authentication failed\r\n".to_string(),
    });
    let (port, _log) = mock_control_port(script).await;

    let err = client(port)
        .get_info(&["version"])
        .await
        .expect_err("rejected");
    assert!(err.to_string().contains("515"), "got {}", err);
}

#[tokio::test]
async fn test_silent_control_port_times_out() {
    let script: Script = Arc::new(|_: &str| String::new());
    let (port, _log) = mock_control_port(script).await;

    let client = ControlPortClient::new(ControlPortConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_millis(200),
    });
    let err = client.get_info(&["version"]).await.expect_err("timeout");
    assert!(err.is_timeout(), "got {:?}", err);
    assert!(matches!(client.protocol_info().await, ControlProbe::Unreachable { .. }));
}

#[tokio::test]
async fn test_live_onions_falls_back_to_second_key() {
    let (port, _log) = mock_control_port(null_auth_tor(standard_getinfo)).await;

    let report = client(port).get_live_onion_addresses().await;
    assert!(report.is_ok(), "error: {:?}", report.error);
    assert!(report.reachable);
    assert_eq!(report.version.as_deref(), Some("0.4.8.9"));
    assert_eq!(report.used_key.as_deref(), Some("onions/current"));
    assert_eq!(report.onions, vec!["aaaa", "bbbb"]);

    let result = reconcile(&["aaaa.onion", "cccc"], &report.onions);
    assert_eq!(result.active, vec!["aaaa"]);
    assert_eq!(result.missing, vec!["cccc"]);
    assert_eq!(result.unexpected, vec!["bbbb"]);
}

#[tokio::test]
async fn test_live_onions_no_supported_key() {
    fn only_version(key: &str) -> String {
        match key {
            "version" => "250-version=0.4.8.9\r\n250 OK\r\n".to_string(),
            other => format!("552 Unrecognized key \"{}\"\r\n", other),
        }
    }
    let (port, _log) = mock_control_port(null_auth_tor(only_version)).await;

    let report = client(port).get_live_onion_addresses().await;
    assert!(report.reachable);
    assert!(!report.is_ok());
    assert!(report.onions.is_empty());
    assert_eq!(report.used_key, None);
    assert!(report.error.as_deref().unwrap_or_default().contains("supports none"));
}

#[tokio::test]
async fn test_live_onions_keeps_tor_error() {
    fn no_services(key: &str) -> String {
        match key {
            "version" => "250-version=0.4.8.9\r\n250 OK\r\n".to_string(),
            _ => "551 No onion services of the specified type.\r\n".to_string(),
        }
    }
    let (port, _log) = mock_control_port(null_auth_tor(no_services)).await;

    let report = client(port).get_live_onion_addresses().await;
    assert!(report.reachable);
    assert!(!report.is_ok());
    let error = report.error.expect("error set");
    assert!(error.contains("551"), "got {}", error);
    assert!(!error.contains("supports none"), "got {}", error);
}

#[tokio::test]
async fn test_live_onions_unreachable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let report = client(port).get_live_onion_addresses().await;
    assert!(!report.reachable);
    assert!(!report.is_ok());
    assert!(report.onions.is_empty());
}
