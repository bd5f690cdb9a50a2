use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::debug;

use crate::server::framing;
use crate::server::protocol::{Reply, Request};

/// Bound on every cross-process step: connect, identify, launch.
pub const IPC_TIMEOUT: Duration = Duration::from_secs(5);

/// A reachable server, as it reported itself. `uid` and `display` come from
/// the server's own `Identity` reply — the socket path alone is never
/// trusted.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerHandle {
    pub socket: PathBuf,
    pub uid: u32,
    pub display: String,
}

/// A successfully published server identity. The socket file is removed by
/// the server on shutdown.
pub struct Published {
    pub listener: UnixListener,
    pub path: PathBuf,
}

/// Per-user socket directory: `$TMPDIR/tern-{uid}/` or `/tmp/tern-{uid}/`.
pub fn socket_dir() -> PathBuf {
    let uid = nix::unistd::getuid();
    let base = std::env::var("TMPDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"));
    base.join(format!("tern-{}", uid))
}

/// One coordination endpoint per display.
pub fn socket_path(display: &str) -> PathBuf {
    socket_dir().join(format!("{}.sock", display.replace('/', "_")))
}

/// Best-effort server discovery for a display. Absence, timeouts and
/// handshake failures all resolve to `None`; a socket nobody answers on is
/// stale and gets removed.
pub async fn locate(display: &str) -> Option<ServerHandle> {
    locate_at(&socket_path(display)).await
}

pub async fn locate_at(path: &Path) -> Option<ServerHandle> {
    if !path.exists() {
        return None;
    }

    let mut stream = match timeout(IPC_TIMEOUT, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(path = %path.display(), error = %e, "removing stale socket");
            let _ = std::fs::remove_file(path);
            return None;
        }
        Err(_) => return None,
    };

    let handshake = async {
        framing::send(&mut stream, &Request::Identify).await?;
        framing::recv_required::<_, Reply>(&mut stream).await
    };
    match timeout(IPC_TIMEOUT, handshake).await {
        Ok(Ok(Reply::Identity { uid, display })) => Some(ServerHandle {
            socket: path.to_path_buf(),
            uid,
            display,
        }),
        _ => None,
    }
}

/// Atomically publish this process as the server for a display. The bind is
/// the test-and-set: `AddrInUse` means another process won the race.
pub fn publish(display: &str) -> std::io::Result<Published> {
    publish_at(socket_path(display))
}

pub fn publish_at(path: PathBuf) -> std::io::Result<Published> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
        // Sockets carry the caller's identity; keep the directory private.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    let listener = UnixListener::bind(&path)?;
    Ok(Published { listener, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::framing;
    use crate::server::protocol::{Reply, Request};

    #[tokio::test]
    async fn locate_missing_socket_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.sock");
        assert_eq!(locate_at(&path).await, None);
    }

    #[tokio::test]
    async fn locate_stale_socket_is_none_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        // bind then drop: the file stays but nobody listens
        let published = publish_at(path.clone()).unwrap();
        drop(published.listener);
        assert!(path.exists());

        assert_eq!(locate_at(&path).await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn locate_live_server_returns_its_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.sock");
        let published = publish_at(path.clone()).unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = published.listener.accept().await.unwrap();
            let req: Request = framing::recv_required(&mut stream).await.unwrap();
            assert!(matches!(req, Request::Identify));
            framing::send(
                &mut stream,
                &Reply::Identity {
                    uid: 4242,
                    display: ":9".to_string(),
                },
            )
            .await
            .unwrap();
        });

        let handle = locate_at(&path).await.unwrap();
        assert_eq!(handle.uid, 4242);
        assert_eq!(handle.display, ":9");
        assert_eq!(handle.socket, path);
    }

    #[tokio::test]
    async fn publication_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.sock");
        let _winner = publish_at(path.clone()).unwrap();
        let loser = publish_at(path.clone());
        assert!(loser.is_err());
        assert_eq!(
            loser.err().map(|e| e.kind()),
            Some(std::io::ErrorKind::AddrInUse)
        );
    }

    #[test]
    fn socket_path_sanitizes_display_names() {
        let p = socket_path("unix/:10.0");
        let name = p.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, "unix_:10.0.sock");
        assert!(!name.contains('/'));
    }
}
