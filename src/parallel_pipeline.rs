// THEORY:
// A trap installation may run several cameras at once. Streams share nothing:
// each has its own background model, its own subtraction models and its own
// track list. The pool therefore gives every stream one dedicated worker task
// that owns a `VisionPipeline` outright, and talks to it only through channels.
//
// Key architectural principles:
// 1.  **One owner per stream**: a stream's pipeline lives inside its worker and
//     is never shared, so no locking is needed.
// 2.  **Ordered per stream**: each worker drains an unbounded FIFO channel, so
//     frames of one stream are processed in the order they were submitted.
// 3.  **Blocking work off the reactor**: detection and tracking are CPU-bound
//     and run inside `spawn_blocking`; the worker only shuttles messages.

use crate::config::Config;
use crate::error::{Result, VisionError};
use crate::pipeline::{AcceptAll, FrameReport, InterestFilter, VisionPipeline};
use futures::stream::{self, StreamExt};
use image::RgbImage;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct FrameTask {
    pub frame: RgbImage,
    pub result_sender: oneshot::Sender<Result<FrameReport>>,
}

pub struct StreamPool {
    task_senders: Vec<mpsc::UnboundedSender<FrameTask>>,
    workers: Vec<JoinHandle<()>>,
}

impl StreamPool {
    /// Starts `streams` workers that keep every blob. Must be called from within
    /// a tokio runtime.
    pub fn new(config: &Config, streams: usize) -> Result<Self> {
        Self::with_filter(config, streams, AcceptAll)
    }

    /// Starts `streams` workers, each with its own copy of `filter`.
    pub fn with_filter<F>(config: &Config, streams: usize, filter: F) -> Result<Self>
    where
        F: InterestFilter + Clone + Send + 'static,
    {
        let mut task_senders = Vec::with_capacity(streams);
        let mut workers = Vec::with_capacity(streams);

        for stream in 0..streams {
            let pipeline = VisionPipeline::with_filter(config, filter.clone())?;
            let (task_sender, task_receiver) = mpsc::unbounded_channel::<FrameTask>();
            workers.push(tokio::spawn(Self::run_worker(stream, pipeline, task_receiver)));
            task_senders.push(task_sender);
        }

        debug!(streams, "stream pool started");
        Ok(Self {
            task_senders,
            workers,
        })
    }

    async fn run_worker<F>(
        stream: usize,
        mut pipeline: VisionPipeline<F>,
        mut task_receiver: mpsc::UnboundedReceiver<FrameTask>,
    ) where
        F: InterestFilter + Send + 'static,
    {
        while let Some(task) = task_receiver.recv().await {
            let FrameTask {
                frame,
                result_sender,
            } = task;
            let joined = tokio::task::spawn_blocking(move || {
                let result = pipeline.process_frame(&frame);
                (pipeline, result)
            })
            .await;

            match joined {
                Ok((returned, result)) => {
                    pipeline = returned;
                    let _ = result_sender.send(result);
                }
                Err(error) => {
                    warn!(stream, %error, "stream worker aborted");
                    let _ = result_sender.send(Err(VisionError::WorkerStopped));
                    return;
                }
            }
        }
        debug!(stream, "stream worker finished");
    }

    pub fn stream_count(&self) -> usize {
        self.task_senders.len()
    }

    /// Queues `frame` on `stream` and returns the channel its report arrives on.
    pub fn submit(
        &self,
        stream: usize,
        frame: RgbImage,
    ) -> Result<oneshot::Receiver<Result<FrameReport>>> {
        let sender = self
            .task_senders
            .get(stream)
            .ok_or(VisionError::UnknownStream(stream))?;
        let (result_sender, result_receiver) = oneshot::channel();
        sender
            .send(FrameTask {
                frame,
                result_sender,
            })
            .map_err(|_| VisionError::WorkerStopped)?;
        Ok(result_receiver)
    }

    /// Processes one frame on `stream`.
    pub async fn process_frame(&self, stream: usize, frame: RgbImage) -> Result<FrameReport> {
        let receiver = self.submit(stream, frame)?;
        receiver.await.map_err(|_| VisionError::WorkerStopped)?
    }

    /// Processes `(stream, frame)` pairs. All frames are queued in input order, so
    /// each stream sees its frames in that order; replies are awaited with at
    /// most `num_cpus` in flight and returned in input order.
    pub async fn process_batch(&self, frames: Vec<(usize, RgbImage)>) -> Vec<Result<FrameReport>> {
        let pending: Vec<_> = frames
            .into_iter()
            .map(|(stream, frame)| self.submit(stream, frame))
            .collect();

        let mut results: Vec<(usize, Result<FrameReport>)> = stream::iter(pending.into_iter().enumerate())
            .map(|(index, submitted)| async move {
                let result = match submitted {
                    Ok(receiver) => receiver.await.unwrap_or(Err(VisionError::WorkerStopped)),
                    Err(error) => Err(error),
                };
                (index, result)
            })
            .buffer_unordered(num_cpus::get().max(1))
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Closes every stream and waits for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.task_senders);
        for worker in self.workers {
            if let Err(error) = worker.await {
                warn!(%error, "stream worker did not shut down cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config() -> Config {
        let mut config = Config::default();
        config.blob_detector.min_area = 50;
        config
    }

    fn frame(square: Option<(u32, u32)>) -> RgbImage {
        let mut frame = RgbImage::from_pixel(64, 64, Rgb([220, 220, 220]));
        if let Some((x, y)) = square {
            for yy in y..y + 12 {
                for xx in x..x + 12 {
                    frame.put_pixel(xx, yy, Rgb([10, 10, 10]));
                }
            }
        }
        frame
    }

    #[tokio::test]
    async fn streams_keep_independent_state() {
        let pool = StreamPool::new(&config(), 2).unwrap();
        assert_eq!(pool.stream_count(), 2);

        pool.process_frame(0, frame(None)).await.unwrap();
        pool.process_frame(1, frame(None)).await.unwrap();
        let a = pool.process_frame(0, frame(Some((10, 10)))).await.unwrap();
        let b = pool.process_frame(1, frame(None)).await.unwrap();

        assert_eq!(a.tracks.len(), 1);
        assert_eq!(a.tracks[0].track_id, Some(1));
        assert!(b.tracks.is_empty());
        assert_eq!(a.frame_id, 2);
        assert_eq!(b.frame_id, 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn batch_preserves_per_stream_order() {
        let pool = StreamPool::new(&config(), 2).unwrap();
        let frames = vec![
            (0, frame(None)),
            (1, frame(None)),
            (0, frame(Some((20, 20)))),
            (1, frame(Some((30, 30)))),
            (0, frame(Some((21, 21)))),
        ];
        let results = pool.process_batch(frames).await;
        let ids: Vec<u64> = results
            .iter()
            .map(|r| r.as_ref().unwrap().frame_id)
            .collect();
        assert_eq!(ids, vec![1, 1, 2, 2, 3]);

        let last = results[4].as_ref().unwrap();
        assert_eq!(last.tracks.len(), 1);
        assert_eq!(last.tracks[0].track_id, Some(1));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_stream_is_an_error() {
        let pool = StreamPool::new(&config(), 1).unwrap();
        assert!(matches!(
            pool.process_frame(3, frame(None)).await,
            Err(VisionError::UnknownStream(3))
        ));
        let results = pool.process_batch(vec![(0, frame(None)), (5, frame(None))]).await;
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(VisionError::UnknownStream(5))));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_config_fails_before_spawning() {
        let mut bad = config();
        bad.tracker.scales.clear();
        assert!(matches!(
            StreamPool::new(&bad, 2),
            Err(VisionError::InvalidConfig(_))
        ));
    }
}
