#[cfg(test)]
mod integration_tests {
    use crate::channel::spawn_channel;
    use crate::config::ClientConfig;
    use crate::connection::{ConnectionState, Scheduler};
    use crate::error::ClientError;
    use crate::status::{OutboundMessage, TaskCommand, TaskConfig, TaskStatus};
    use crate::SyncClient;

    use futures_util::future::BoxFuture;
    use futures_util::{SinkExt, StreamExt};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    const WAIT: Duration = Duration::from_secs(5);
    const PING: &str = r#"{"Type":"PING"}"#;

    type Timer = (Duration, oneshot::Sender<()>);

    /// Hands every sleep to the test. A sleep ends when its sender fires or
    /// is dropped.
    struct ManualScheduler(mpsc::UnboundedSender<Timer>);

    impl ManualScheduler {
        fn new() -> (Self, mpsc::UnboundedReceiver<Timer>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self(tx), rx)
        }
    }

    impl Scheduler for ManualScheduler {
        fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
            let (fire, fired) = oneshot::channel();
            let _ = self.0.send((delay, fire));
            Box::pin(async move {
                let _ = fired.await;
            })
        }
    }

    /// Next sleep that is not a connect timeout. Connect timeouts seen on
    /// the way are kept pending in `held`.
    async fn next_retry(
        timers: &mut mpsc::UnboundedReceiver<Timer>,
        connect_timeout: Duration,
        held: &mut Vec<Timer>,
    ) -> Timer {
        loop {
            let timer = timeout(WAIT, timers.recv()).await.unwrap().unwrap();
            if timer.0 != connect_timeout {
                return timer;
            }
            held.push(timer);
        }
    }

    fn client_for(port: u16, max_attempts: u32) -> SyncClient {
        SyncClient::new(ClientConfig {
            agent_url: format!("http://127.0.0.1:{port}"),
            connect_timeout_ms: 2_000,
            max_attempts,
            min_reconnect_delay_ms: 50,
            max_reconnect_delay_ms: 100,
            ..Default::default()
        })
        .unwrap()
    }

    async fn next_text(
        ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    ) -> Option<String> {
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                return Some(text);
            }
        }
        None
    }

    type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

    /// Answers every HTTP request with `handler(path, body)` and closes.
    async fn spawn_http(handler: Arc<Handler>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                let header_end = loop {
                    let n = stream.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break None;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else { continue };
                let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
                let length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while raw.len() < header_end + length {
                    let n = stream.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                }
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let body = String::from_utf8_lossy(&raw[header_end..]).to_string();

                let (status, reply) = handler(&path, &body);
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                    reply.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_status_channel_pings_and_mirrors_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (first_tx, first_rx) = oneshot::channel();
        let (cmd_tx, cmd_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = first_tx.send(next_text(&mut ws).await);
            ws.send(Message::Text(
                r#"{"Type":"STATE","Content":{"UUID":"a","Status":3,"Config":{"Uuid":"a","Label":"Docs"}}}"#
                    .to_string(),
            ))
            .await
            .unwrap();
            let _ = cmd_tx.send(next_text(&mut ws).await);
            while ws.next().await.is_some() {}
        });

        let client = client_for(port, 5);
        let mut channel = client.status_channel();
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
        channel.subscribe_tasks(move |tasks| {
            let _ = updates_tx.send(tasks.len());
        });
        let (handle, task) = client.spawn_status(channel).unwrap();

        let first = timeout(WAIT, first_rx).await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some(PING));
        assert_eq!(timeout(WAIT, updates_rx.recv()).await.unwrap(), Some(1));
        assert_eq!(handle.state(), ConnectionState::Open);

        handle
            .send_message(&OutboundMessage::Cmd {
                uuid: Some("a".to_string()),
                cmd: TaskCommand::Pause,
            })
            .unwrap();
        let cmd = timeout(WAIT, cmd_rx).await.unwrap().unwrap().unwrap();
        assert_eq!(cmd, r#"{"Type":"CMD","Content":{"UUID":"a","Cmd":"pause"}}"#);

        handle.close().unwrap();
        let channel = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(channel.task("a").unwrap().status, TaskStatus::Processing);
        assert!(!channel.snapshot().connected);
    }

    #[tokio::test]
    async fn test_send_is_refused_until_open() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = client_for(port, 2);
        let (mut handle, task) = client.spawn_status(client.status_channel()).unwrap();

        timeout(WAIT, handle.wait_for_state(ConnectionState::MaxAttemptsReached))
            .await
            .unwrap()
            .unwrap();
        let err = handle.send_message(&OutboundMessage::Ping).unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));

        handle.close().unwrap();
        let channel = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(channel.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_status_channel_redials_after_agent_drops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (pings_tx, mut pings_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = pings_tx.send(next_text(&mut ws).await);
            drop(ws);

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = pings_tx.send(next_text(&mut ws).await);
            while ws.next().await.is_some() {}
        });

        let client = client_for(port, 5);
        let connect_timeout = client.config.connect_timeout();
        let (scheduler, mut timers) = ManualScheduler::new();
        let (mut handle, task) = spawn_channel(
            client.status_channel(),
            client.config.status_url().unwrap(),
            connect_timeout,
            scheduler,
        );
        let mut held = Vec::new();

        let first = timeout(WAIT, pings_rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some(PING));

        let (delay, fire) = next_retry(&mut timers, connect_timeout, &mut held).await;
        assert_eq!(delay, client.config.reconnect_policy().delay_for(1));
        assert_eq!(handle.state(), ConnectionState::Reconnecting);

        // Nothing redials before the retry delay is over
        assert!(timeout(Duration::from_millis(200), pings_rx.recv())
            .await
            .is_err());
        fire.send(()).unwrap();

        let second = timeout(WAIT, pings_rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.as_deref(), Some(PING));
        timeout(WAIT, handle.wait_for_state(ConnectionState::Open))
            .await
            .unwrap()
            .unwrap();

        handle.close().unwrap();
        let channel = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(!channel.snapshot().connected);
        drop(held);
    }

    #[tokio::test]
    async fn test_force_reconnect_leaves_max_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (pings_tx, mut pings_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            // First dial: hang up before the handshake
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = pings_tx.send(next_text(&mut ws).await);
            while ws.next().await.is_some() {}
        });

        let client = client_for(port, 1);
        let connect_timeout = client.config.connect_timeout();
        let (scheduler, mut timers) = ManualScheduler::new();
        let (mut handle, task) = spawn_channel(
            client.status_channel(),
            client.config.status_url().unwrap(),
            connect_timeout,
            scheduler,
        );

        timeout(WAIT, handle.wait_for_state(ConnectionState::MaxAttemptsReached))
            .await
            .unwrap()
            .unwrap();
        assert!(pings_rx.try_recv().is_err());

        handle.force_reconnect().unwrap();
        let ping = timeout(WAIT, pings_rx.recv()).await.unwrap().unwrap();
        assert_eq!(ping.as_deref(), Some(PING));
        timeout(WAIT, handle.wait_for_state(ConnectionState::Open))
            .await
            .unwrap()
            .unwrap();

        handle.close().unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();

        // The degraded state never schedules a retry
        while let Ok((delay, _)) = timers.try_recv() {
            assert_eq!(delay, connect_timeout);
        }
    }

    #[tokio::test]
    async fn test_close_is_honored_while_dialing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (accepted_tx, accepted_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = accepted_tx.send(());
            // Never answer the handshake
            let mut buf = [0u8; 1024];
            while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
        });

        let client = client_for(port, 5);
        // Connect timeouts never fire while `_timers` holds them
        let (scheduler, _timers) = ManualScheduler::new();
        let (handle, task) = spawn_channel(
            client.status_channel(),
            client.config.status_url().unwrap(),
            client.config.connect_timeout(),
            scheduler,
        );

        timeout(WAIT, accepted_rx).await.unwrap().unwrap();
        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert!(matches!(
            handle.send_raw(PING.to_string()),
            Err(ClientError::NotConnected)
        ));

        handle.close().unwrap();
        let channel = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(!channel.snapshot().connected);
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_logs_channel_fills_log_manager() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(
                "2024-05-01T10:00:00Z\tINFO\tsync\tstarting\n".to_string(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text("\x1b[31mplain line\x1b[0m".to_string()))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let client = client_for(port, 5);
        let (handle, task) = client.spawn_logs().unwrap();

        let manager = Arc::clone(&client.log_manager);
        timeout(WAIT, async {
            while manager.len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let logs = manager.get_logs(None);
        assert_eq!(logs[0].message, "starting");
        assert_eq!(logs[1].message, "plain line");

        handle.close().unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_tree_reveal_over_http() {
        let port = spawn_http(Arc::new(|path: &str, body: &str| {
            if path != "/tree" {
                return (404, r#"{"error":"no route"}"#.to_string());
            }
            let listing: serde_json::Value = serde_json::from_str(body).unwrap();
            match listing["Path"].as_str() {
                Some("") => (
                    200,
                    r#"{"Children":[{"Path":"/x","Type":"COLLECTION"},{"Path":"/readme.md","Type":"LEAF"}]}"#
                        .to_string(),
                ),
                Some("/x") => (
                    200,
                    r#"{"Children":[{"Path":"/x/y","Type":"COLLECTION"}]}"#.to_string(),
                ),
                _ => (500, r#"{"error":"permission denied"}"#.to_string()),
            }
        }))
        .await;

        let client = client_for(port, 5);
        let mut tree = client.remote_tree("fs:///", "");
        timeout(WAIT, tree.load(0, Some("/x/y"))).await.unwrap().unwrap();

        let x = tree.find("/x").unwrap();
        assert!(tree.node(x).unwrap().is_loaded());
        assert!(!tree.node(x).unwrap().is_collapsed());
        assert_eq!(tree.node(0).unwrap().children().len(), 1);

        let y = tree.find("/x/y").unwrap();
        let err = timeout(WAIT, tree.load(y, None)).await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        assert!(!tree.node(y).unwrap().is_loading());
    }

    #[tokio::test]
    async fn test_history_is_sorted_and_normalized() {
        let port = spawn_http(Arc::new(|path: &str, _body: &str| {
            assert_eq!(path, "/patches/t1/0/10");
            (
                200,
                r#"{
                    "1": {"Root": {"Stamp": "2024-01-01T00:00:00Z",
                        "Children": [{"Node": {"Path": "a"}, "DataOperation": {"OpType": 0, "Dir": 0}}]},
                        "Stats": {"Source": "router://server/docs"}},
                    "2": {"Root": {"Stamp": "2024-02-01T00:00:00Z"}, "Stats": {"Source": "fs:///docs"}},
                    "3": {"Stats": {"Source": "fs:///docs"}, "Error": "interrupted"}
                }"#
                .to_string(),
            )
        }))
        .await;

        let client = client_for(port, 5);
        let task = TaskConfig {
            uuid: "t1".to_string(),
            left_uri: "fs:///docs".to_string(),
            right_uri: "router://server/docs".to_string(),
            ..Default::default()
        };
        let patches = timeout(WAIT, client.history(&task, 0, 10)).await.unwrap().unwrap();

        let keys: Vec<&str> = patches.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(keys, vec!["2", "1"]);
        let op = patches[1].root.children[0].data_operation.as_ref().unwrap();
        assert_eq!(op.dir, crate::patch::OperationDir::RightToLeft);
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let result = SyncClient::new(ClientConfig {
            agent_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }
}
