use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Background tasks of a running node plus the channel that stops them.
pub struct ServiceHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl ServiceHandle {
    /// New handle and a receiver for tasks spawned before they can be attached.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx, tasks: Vec::new() }, rx)
    }

    pub fn attach(&mut self, name: &'static str, task: JoinHandle<Result<()>>) {
        self.tasks.push((name, task));
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal shutdown and wait for every task in attach order.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        for (name, task) in self.tasks {
            match task.await {
                Ok(Ok(())) => info!(task = name, "service stopped"),
                Ok(Err(e)) => error!(task = name, error = %e, "service returned error"),
                Err(e) => error!(task = name, error = %e, "service task panicked"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_reaches_every_task() {
        let (mut handle, rx) = ServiceHandle::new();
        for name in ["a", "b"] {
            let mut rx = rx.clone();
            handle.attach(
                name,
                tokio::spawn(async move {
                    while !*rx.borrow() {
                        rx.changed().await?;
                    }
                    Ok(())
                }),
            );
        }
        assert_eq!(handle.task_count(), 2);
        handle.shutdown().await.unwrap();
    }
}
