
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use waitgroup::WaitGroup;

use crate::error::Result;

type OperationFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = bool> + Send + 'static>>) + Send + Sync>;

/// Operation is one step run on the session's serial queue. When the
/// future resolves to true the step goes back to the end of the queue.
pub(crate) struct Operation {
    run: OperationFn,
    name: &'static str,
}

impl Operation {
    pub(crate) fn new(
        run: impl FnMut() -> Pin<Box<dyn Future<Output = bool> + Send + 'static>>
            + Send
            + Sync
            + 'static,
        name: &'static str,
    ) -> Self {
        Operation {
            run: Box::new(run),
            name,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("name", &self.name).finish()
    }
}

/// Operations runs queued operations one at a time, in the order they were
/// queued. The worker task lives until `close`.
pub(crate) struct Operations {
    pending: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<Operation>,
    stop: watch::Sender<bool>,
}

impl Operations {
    pub(crate) fn new() -> Self {
        let pending = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop, stopped) = watch::channel(false);

        tokio::spawn(Operations::run(
            Arc::clone(&pending),
            tx.clone(),
            rx,
            stopped,
        ));

        Operations { pending, tx, stop }
    }

    /// enqueue queues `op` behind everything already queued. It fails once
    /// the queue is closed.
    pub(crate) async fn enqueue(&self, op: Operation) -> Result<()> {
        Operations::push(&self.tx, &self.pending, op)
    }

    fn push(
        tx: &mpsc::UnboundedSender<Operation>,
        pending: &AtomicUsize,
        op: Operation,
    ) -> Result<()> {
        pending.fetch_add(1, Ordering::SeqCst);
        tx.send(op).map_err(|err| {
            pending.fetch_sub(1, Ordering::SeqCst);
            err.into()
        })
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// done waits for everything queued so far. It returns at once when
    /// the queue is closed.
    pub(crate) async fn done(&self) {
        let wg = WaitGroup::new();
        let mut worker = Some(wg.worker());
        let barrier = Operation::new(
            move || {
                worker.take();
                Box::pin(async { false })
            },
            "done",
        );
        if self.enqueue(barrier).await.is_ok() {
            wg.wait().await;
        }
    }

    async fn run(
        pending: Arc<AtomicUsize>,
        tx: mpsc::UnboundedSender<Operation>,
        mut rx: mpsc::UnboundedReceiver<Operation>,
        mut stopped: watch::Receiver<bool>,
    ) {
        loop {
            let mut op = tokio::select! {
                _ = stopped.changed() => break,
                op = rx.recv() => match op {
                    Some(op) => op,
                    None => break,
                },
            };

            pending.fetch_sub(1, Ordering::SeqCst);
            log::trace!("running operation {}", op.name);
            if (op.run)().await {
                let _ = Operations::push(&tx, &pending, op);
            }
        }
        rx.close();
    }

    /// close stops the worker. Operations still queued are dropped and
    /// later enqueues fail. Closing twice is harmless.
    pub(crate) async fn close(&self) -> Result<()> {
        let _ = self.stop.send(true);
        Ok(())
    }
}
