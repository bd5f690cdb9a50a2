use std::sync::Arc;

use anyhow::Result;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::config::Config;
use crate::event::ServerEvent;
use crate::launch::LaunchRequest;
use crate::pty::PtyToolkit;
use crate::server::framing;
use crate::server::locate::Published;
use crate::server::protocol::{Reject, Reply, Request};
use crate::window::WindowManager;

/// What this server answers to `Identify` and validates `Launch` against.
#[derive(Clone, Debug)]
pub struct ServerIdentity {
    pub uid: u32,
    pub display: String,
}

/// Realize the initial request and run as the long-lived server until the
/// last window closes (or we are told to stop). With `published` absent
/// this is the `--disable-server` local path: same realization, no socket.
pub async fn run(
    published: Option<Published>,
    request: &LaunchRequest,
    display: &str,
    config: Config,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let toolkit = PtyToolkit::new(config.shell(), event_tx);

    let mut manager = WindowManager::new(Box::new(toolkit), config);
    for window in &request.windows {
        if let Err(e) = manager.realize(window) {
            if let Some(published) = &published {
                let _ = std::fs::remove_file(&published.path);
            }
            return Err(e);
        }
    }
    let manager = Arc::new(Mutex::new(manager));

    let identity = ServerIdentity {
        uid: nix::unistd::geteuid().as_raw(),
        display: display.to_string(),
    };

    let mut socket_file = None;
    let mut accept_loop = None;
    if let Some(published) = published {
        // `display` is reserved by the tracing macros; log the identity field.
        info!(socket = %published.path.display(), display = %identity.display, "serving");
        socket_file = Some(published.path);
        let listener = published.listener;
        let manager = Arc::clone(&manager);
        let identity = identity.clone();
        accept_loop = Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let manager = Arc::clone(&manager);
                        let identity = identity.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, identity, manager).await {
                                warn!(error = %e, "client connection failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }));
    }

    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    loop {
        tokio::select! {
            ev = event_rx.recv() => match ev {
                Some(ServerEvent::TabExited { window, tab }) => {
                    let mut manager = manager.lock().await;
                    if manager.tab_exited(window, tab)? {
                        info!("last window closed, shutting down");
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("terminated, shutting down");
                break;
            }
        }
    }

    if let Some(task) = accept_loop {
        task.abort();
    }
    if let Some(path) = socket_file {
        let _ = std::fs::remove_file(&path);
    }
    Ok(())
}

/// Per-connection request handler: answer `Identify`, validate and realize
/// `Launch`. The Ack only promises the request was accepted; construction
/// may still be completing when it is sent.
pub async fn handle_client(
    mut stream: UnixStream,
    identity: ServerIdentity,
    manager: Arc<Mutex<WindowManager>>,
) -> Result<()> {
    while let Some(request) = framing::recv::<_, Request>(&mut stream).await? {
        match request {
            Request::Identify => {
                framing::send(
                    &mut stream,
                    &Reply::Identity {
                        uid: identity.uid,
                        display: identity.display.clone(),
                    },
                )
                .await?;
            }
            Request::Launch {
                uid,
                display: caller_display,
                windows,
            } => {
                let reply = if uid != identity.uid {
                    warn!(caller = uid, "rejecting launch from another user");
                    Reply::Reject(Reject::UserMismatch {
                        server: identity.uid,
                        caller: uid,
                    })
                } else if caller_display != identity.display {
                    warn!(caller_display = %caller_display, "rejecting launch for another display");
                    Reply::Reject(Reject::DisplayMismatch {
                        server: identity.display.clone(),
                        caller: caller_display,
                    })
                } else {
                    let mut manager = manager.lock().await;
                    // Failures here are server-side: the request was already
                    // validated, and Ack only promises acceptance, not that
                    // every window came up.
                    for window in &windows {
                        if let Err(e) = manager.realize(window) {
                            warn!(error = %e, "window realization failed");
                        }
                    }
                    info!(windows = windows.len(), "launch accepted");
                    Reply::Ack
                };
                framing::send(&mut stream, &reply).await?;
            }
        }
    }
    Ok(())
}
