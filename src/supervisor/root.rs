//! Root supervising context
//!
//! Runs the coordinating work as a task and races it against the interrupt
//! signal, so every way the process can end produces exactly one [`Fault`].

use crate::fault::Fault;
use std::future::Future;
use tracing::error;

/// Run `work` until it ends with a fault or `interrupt` fires
pub async fn supervise<W, I>(work: W, interrupt: I) -> Fault
where
    W: Future<Output = Fault> + Send + 'static,
    I: Future<Output = ()>,
{
    let mut root = tokio::spawn(work);
    tokio::pin!(interrupt);

    tokio::select! {
        joined = &mut root => joined.unwrap_or_else(Fault::from_join_error),
        _ = &mut interrupt => {
            root.abort();
            Fault::Interrupt
        }
    }
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
pub async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::RadioError;
    use crate::test_support::address;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_interrupt_exits_130() {
        let (tx, rx) = oneshot::channel::<()>();
        let work = std::future::pending::<Fault>();

        tx.send(()).unwrap();
        let fault = supervise(work, async {
            rx.await.ok();
        })
        .await;

        assert!(matches!(fault, Fault::Interrupt));
        assert_eq!(fault.log_termination(), 130);
    }

    #[tokio::test]
    async fn test_work_fault_is_returned() {
        let work = async {
            Fault::from(RadioError::Simulated {
                address: address(1),
                message: "adapter vanished".into(),
            })
        };

        let fault = supervise(work, std::future::pending()).await;

        assert_eq!(fault.exit_code(), -1);
        assert!(fault.describe().contains("adapter vanished"));
    }

    async fn buggy_coordinator() -> Fault {
        tokio::time::sleep(Duration::from_millis(1)).await;
        panic!("coordinator bug")
    }

    #[tokio::test]
    async fn test_panic_in_work_is_unclassified() {
        let fault = supervise(buggy_coordinator(), std::future::pending()).await;

        assert!(matches!(&fault, Fault::Unclassified { kind, .. } if kind == "panic"));
        assert_eq!(fault.exit_code(), -1);
        assert_eq!(fault.describe(), "coordinator bug");
    }

    #[tokio::test]
    async fn test_precondition_exits_1() {
        let work = async { Fault::precondition("Bluetooth LE backend 'bluez' was unavailable!") };
        let fault = supervise(work, std::future::pending()).await;
        assert_eq!(fault.log_termination(), 1);
    }
}
