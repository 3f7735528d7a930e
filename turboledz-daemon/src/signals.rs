//! Control notifications
//!
//! OS signals are turned into [`ControlEvent`] messages for the dispatch
//! loop; nothing but the send happens in the listener.
//!
//! | signal | event |
//! |---|---|
//! | SIGTERM, SIGINT | `Terminate` |
//! | SIGHUP | `Reload` |
//! | SIGUSR1 | `Pause` |
//! | SIGUSR2 | `Resume` |

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Pause,
    Resume,
    Reload,
    Terminate,
}

/// Listen for control signals and forward them to `tx` until the receiver goes away.
#[cfg(unix)]
pub fn spawn_listener(tx: mpsc::Sender<ControlEvent>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = term.recv() => ControlEvent::Terminate,
                _ = int.recv() => ControlEvent::Terminate,
                _ = hup.recv() => ControlEvent::Reload,
                _ = usr1.recv() => ControlEvent::Pause,
                _ = usr2.recv() => ControlEvent::Resume,
            };
            debug!("Control signal received: {:?}", event);
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_listener(tx: mpsc::Sender<ControlEvent>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received");
            if tx.send(ControlEvent::Terminate).await.is_err() {
                break;
            }
        }
    }))
}
