//! Delivery of invocation reports from request handlers to the single task owning the result
//! list.
use crate::verification::InvocationReport;
use log::{debug, warn};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// The producer side, cloned into every listener.
#[derive(Clone, Debug)]
pub(crate) struct ReportSink(mpsc::UnboundedSender<InvocationReport>);

impl ReportSink {
    pub(crate) fn send(&self, report: InvocationReport) {
        if self.0.send(report).is_err() {
            warn!("An invocation report was produced after the collector stopped: it was dropped.");
        }
    }
}

/// The consumer task and the means to stop it.
pub(crate) struct Collector {
    task: JoinHandle<Vec<InvocationReport>>,
    drain: oneshot::Sender<Duration>,
}

/// Spawn the collector on the current runtime.
pub(crate) fn spawn_collector() -> (ReportSink, Collector) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (drain_tx, drain_rx) = oneshot::channel();
    let task = tokio::spawn(collect(rx, drain_rx));
    (
        ReportSink(tx),
        Collector {
            task,
            drain: drain_tx,
        },
    )
}

impl Collector {
    /// Wait for every in-flight report, for at most `grace`, and return the result list.
    ///
    /// Reports still buffered in the channel when `grace` runs out are kept; producers that
    /// have not sent by then are ignored.
    pub(crate) async fn finish(self, grace: Duration) -> Vec<InvocationReport> {
        let _ = self.drain.send(grace);
        match self.task.await {
            Ok(reports) => reports,
            Err(e) => {
                warn!("The invocation report collector failed: {}", e);
                Vec::new()
            }
        }
    }
}

async fn collect(
    mut rx: mpsc::UnboundedReceiver<InvocationReport>,
    mut drain: oneshot::Receiver<Duration>,
) -> Vec<InvocationReport> {
    let mut reports = Vec::new();
    loop {
        tokio::select! {
            report = rx.recv() => match report {
                Some(report) => reports.push(report),
                // Every producer is gone.
                None => return reports,
            },
            grace = &mut drain => {
                let grace = grace.unwrap_or_default();
                let drained = tokio::time::timeout(grace, async {
                    while let Some(report) = rx.recv().await {
                        reports.push(report);
                    }
                })
                .await;
                if drained.is_err() {
                    debug!("Some connections were still open when the report drain timed out.");
                }
                rx.close();
                while let Ok(report) = rx.try_recv() {
                    reports.push(report);
                }
                return reports;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockId;

    #[tokio::test]
    async fn reports_from_many_producers_are_all_collected() {
        let (sink, collector) = spawn_collector();
        let producers = (0..100)
            .map(|i| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    sink.send(InvocationReport::not_called(MockId(i), format!("m{}", i)));
                })
            })
            .collect::<Vec<_>>();
        for producer in producers {
            producer.await.unwrap();
        }
        drop(sink);

        let reports = collector.finish(Duration::from_secs(1)).await;
        assert_eq!(reports.len(), 100);
    }

    #[tokio::test]
    async fn a_lingering_producer_does_not_block_the_drain() {
        let (sink, collector) = spawn_collector();
        sink.send(InvocationReport::not_called(MockId(0), "m0".into()));

        // `sink` stays alive: the drain has to give up after the grace period.
        let reports = collector.finish(Duration::from_millis(50)).await;
        assert_eq!(reports.len(), 1);
        drop(sink);
    }
}
