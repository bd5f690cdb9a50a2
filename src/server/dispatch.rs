use anyhow::{anyhow, Result};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::LaunchError;
use crate::launch::LaunchRequest;
use crate::server::daemon;
use crate::server::framing;
use crate::server::locate::{self, ServerHandle, IPC_TIMEOUT};
use crate::server::protocol::{Reply, Request};

/// Decide this invocation's fate: hand the request to a running server, or
/// become the server ourselves. Cross-process failures get exactly one
/// fallback: remote → local after a transport failure, publish → remote
/// after a lost bind race. Never more.
pub async fn dispatch(
    request: LaunchRequest,
    handle: Option<ServerHandle>,
    display: &str,
    config: Config,
) -> Result<(), LaunchError> {
    if request.disable_server {
        info!("server coordination disabled, realizing locally");
        return daemon::run(None, &request, display, config)
            .await
            .map_err(|e| LaunchError::Failed(e.to_string()));
    }

    if let Some(handle) = handle {
        match validate(&handle, display) {
            Ok(()) => match remote_launch(&handle, &request, display).await {
                Ok(Reply::Ack) => {
                    info!("launch handed to running server");
                    return Ok(());
                }
                Ok(Reply::Reject(reject)) => return Err(reject.into()),
                Ok(other) => {
                    return Err(LaunchError::Failed(format!(
                        "unexpected reply from server: {:?}",
                        other
                    )))
                }
                // The server died between locate and dispatch. One local
                // fallback, no remote retry.
                Err(e) => warn!(error = %e, "server unreachable, falling back to local launch"),
            },
            Err(e) => {
                // The mismatched server still holds the display's socket, so
                // publication cannot succeed. Realize locally, no socket.
                warn!(error = %e, "ignoring mismatched server, realizing locally");
                return daemon::run(None, &request, display, config)
                    .await
                    .map_err(|e| LaunchError::Failed(e.to_string()));
            }
        }
    }

    match locate::publish(display) {
        Ok(published) => daemon::run(Some(published), &request, display, config)
            .await
            .map_err(|e| LaunchError::Failed(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            // Either another process won the bind race, or a dead server
            // left its socket behind. Locating tells the two apart: a live
            // winner answers, a stale socket gets cleaned up.
            info!("socket already taken, checking for a live server");
            match locate::locate(display).await {
                Some(handle) => {
                    validate(&handle, display).map_err(|e| {
                        LaunchError::Failed(format!("race winner is unusable: {}", e))
                    })?;
                    match remote_launch(&handle, &request, display).await {
                        Ok(Reply::Ack) => Ok(()),
                        Ok(Reply::Reject(reject)) => Err(reject.into()),
                        Ok(other) => Err(LaunchError::Failed(format!(
                            "unexpected reply from server: {:?}",
                            other
                        ))),
                        Err(e) => Err(LaunchError::Failed(format!(
                            "server unreachable after publication race: {}",
                            e
                        ))),
                    }
                }
                None => {
                    // Stale socket, now removed. One final bind attempt.
                    let published = locate::publish(display).map_err(|e| {
                        LaunchError::Failed(format!("cannot publish server socket: {}", e))
                    })?;
                    daemon::run(Some(published), &request, display, config)
                        .await
                        .map_err(|e| LaunchError::Failed(e.to_string()))
                }
            }
        }
        Err(e) => Err(LaunchError::Failed(format!(
            "cannot publish server socket: {}",
            e
        ))),
    }
}

/// A located handle is only usable by its own user, for its own display.
fn validate(handle: &ServerHandle, display: &str) -> Result<(), LaunchError> {
    let caller = nix::unistd::geteuid().as_raw();
    if handle.uid != caller {
        return Err(LaunchError::UserMismatch {
            server: handle.uid,
            caller,
        });
    }
    if handle.display != display {
        return Err(LaunchError::DisplayMismatch {
            server: handle.display.clone(),
            caller: display.to_string(),
        });
    }
    Ok(())
}

/// Invoke the launch operation on a running server, bounded by
/// `IPC_TIMEOUT`. Transport errors bubble up so `dispatch` can fall back.
async fn remote_launch(
    handle: &ServerHandle,
    request: &LaunchRequest,
    display: &str,
) -> Result<Reply> {
    let op = async {
        let mut stream = UnixStream::connect(&handle.socket).await?;
        framing::send(
            &mut stream,
            &Request::Launch {
                uid: nix::unistd::geteuid().as_raw(),
                display: display.to_string(),
                windows: request.windows.clone(),
            },
        )
        .await?;
        framing::recv_required::<_, Reply>(&mut stream).await
    };
    timeout(IPC_TIMEOUT, op)
        .await
        .map_err(|_| anyhow!("timed out waiting for server reply"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::locate::publish_at;
    use crate::server::protocol::Reject;
    use std::path::PathBuf;

    fn handle(socket: PathBuf, uid: u32, display: &str) -> ServerHandle {
        ServerHandle {
            socket,
            uid,
            display: display.to_string(),
        }
    }

    #[test]
    fn validate_rejects_foreign_uid() {
        let our_uid = nix::unistd::geteuid().as_raw();
        let h = handle(PathBuf::from("/nonexistent"), our_uid + 1, ":0");
        match validate(&h, ":0") {
            Err(LaunchError::UserMismatch { server, caller }) => {
                assert_eq!(server, our_uid + 1);
                assert_eq!(caller, our_uid);
            }
            other => panic!("expected UserMismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn validate_rejects_other_display() {
        let our_uid = nix::unistd::geteuid().as_raw();
        let h = handle(PathBuf::from("/nonexistent"), our_uid, ":1");
        assert!(matches!(
            validate(&h, ":0"),
            Err(LaunchError::DisplayMismatch { .. })
        ));
    }

    #[test]
    fn validate_accepts_matching_identity() {
        let our_uid = nix::unistd::geteuid().as_raw();
        let h = handle(PathBuf::from("/nonexistent"), our_uid, ":0");
        assert!(validate(&h, ":0").is_ok());
    }

    /// One-shot responder: accept a connection, read a Launch, send `reply`.
    fn spawn_responder(published: locate::Published, reply: Reply) {
        tokio::spawn(async move {
            let (mut stream, _) = published.listener.accept().await.unwrap();
            let req: Request = framing::recv_required(&mut stream).await.unwrap();
            assert!(matches!(req, Request::Launch { .. }));
            framing::send(&mut stream, &reply).await.unwrap();
        });
    }

    #[tokio::test]
    async fn remote_launch_gets_ack() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv.sock");
        let published = publish_at(path.clone()).unwrap();
        spawn_responder(published, Reply::Ack);

        let our_uid = nix::unistd::geteuid().as_raw();
        let h = handle(path, our_uid, ":5");
        let reply = remote_launch(&h, &LaunchRequest::default(), ":5")
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ack);
    }

    #[tokio::test]
    async fn remote_reject_maps_to_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv.sock");
        let published = publish_at(path.clone()).unwrap();
        spawn_responder(
            published,
            Reply::Reject(Reject::DisplayMismatch {
                server: ":0".into(),
                caller: ":5".into(),
            }),
        );

        let our_uid = nix::unistd::geteuid().as_raw();
        let h = handle(path, our_uid, ":5");
        let reply = remote_launch(&h, &LaunchRequest::default(), ":5")
            .await
            .unwrap();
        let Reply::Reject(reject) = reply else {
            panic!("expected a rejection");
        };
        let err: LaunchError = reject.into();
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn remote_launch_surfaces_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let our_uid = nix::unistd::geteuid().as_raw();
        // Nobody listening: the connect fails, dispatch would fall back.
        let h = handle(dir.path().join("gone.sock"), our_uid, ":5");
        assert!(remote_launch(&h, &LaunchRequest::default(), ":5")
            .await
            .is_err());
    }

    /// One window whose single tab runs a command that exits immediately,
    /// so a local server run terminates on its own.
    fn short_lived_request() -> LaunchRequest {
        let mut spec = crate::launch::WindowSpec::default();
        spec.tabs[0].command = vec!["true".into()];
        LaunchRequest {
            windows: vec![spec],
            ..LaunchRequest::default()
        }
    }

    #[tokio::test]
    async fn mismatched_server_realizes_locally() {
        let dir = tempfile::tempdir().unwrap();
        let our_uid = nix::unistd::geteuid().as_raw();
        let display = ":tern-test-fallback";
        // A handle owned by someone else. Its socket must stay untouched,
        // and no socket of our own may appear for the display.
        let h = handle(dir.path().join("other.sock"), our_uid + 1, display);

        dispatch(short_lived_request(), Some(h), display, Config::default())
            .await
            .unwrap();
        assert!(!locate::socket_path(display).exists());
    }

    #[tokio::test]
    async fn lost_publish_race_hands_launch_to_winner() {
        let our_uid = nix::unistd::geteuid().as_raw();
        let display = ":tern-test-race";
        // Bind first, playing the process that won the race.
        let published = locate::publish(display).unwrap();
        let path = published.path.clone();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            // discovery handshake
            let (mut s, _) = published.listener.accept().await.unwrap();
            let req: Request = framing::recv_required(&mut s).await.unwrap();
            assert!(matches!(req, Request::Identify));
            framing::send(
                &mut s,
                &Reply::Identity {
                    uid: our_uid,
                    display: ":tern-test-race".to_string(),
                },
            )
            .await
            .unwrap();
            // the retried launch
            let (mut s, _) = published.listener.accept().await.unwrap();
            let req: Request = framing::recv_required(&mut s).await.unwrap();
            assert!(matches!(req, Request::Launch { .. }));
            framing::send(&mut s, &Reply::Ack).await.unwrap();
            done_tx.send(()).unwrap();
        });

        let result = dispatch(LaunchRequest::default(), None, display, Config::default()).await;
        assert!(result.is_ok());
        done_rx.await.unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn stale_socket_is_replaced_and_served() {
        let display = ":tern-test-stale";
        // A dead server leaves its socket file behind.
        let published = locate::publish(display).unwrap();
        let path = published.path.clone();
        drop(published);
        assert!(path.exists());

        dispatch(short_lived_request(), None, display, Config::default())
            .await
            .unwrap();
        // The replacement server ran to completion and cleaned up after itself.
        assert!(!path.exists());
    }
}
