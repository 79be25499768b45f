//! The process-wide frame clock driving the decay ring.

use crate::canvas::SharedCanvas;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Spawn the task that advances the shared canvas once per `frame_interval`.
pub fn spawn_frame_clock(
    canvas: SharedCanvas,
    frame_interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(frame_clock_task(canvas, frame_interval, cancellation_token))
}

/// Async task ticking the decay engine and broadcasting each frame.
pub async fn frame_clock_task(
    canvas: SharedCanvas,
    frame_interval: Duration,
    cancellation_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(frame_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                canvas.advance_frame();
            },
            _ = cancellation_token.cancelled() => break,
        }
    }
    log::debug!("frame clock stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::broadcast::tests::RecordingViewer;
    use crate::gradient::GradientTable;
    use std::sync::Arc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn clock_delivers_frames_and_stops_on_cancel() {
        let canvas = SharedCanvas::new(GradientTable::builtin().unwrap());
        let viewer = Arc::new(RecordingViewer::default());
        canvas.viewers.add(viewer.clone());
        let gradient = canvas.gradients.random(&mut rand::thread_rng());
        canvas.decay.add_point(1, 1, &gradient);

        let token = CancellationToken::new();
        let clock = spawn_frame_clock(canvas.clone(), Duration::from_millis(1), token.clone());

        timeout(Duration::from_secs(2), async {
            while viewer.updates.lock().len() < 3 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("frames were not delivered");

        token.cancel();
        timeout(Duration::from_millis(500), clock)
            .await
            .expect("clock did not stop")
            .unwrap();
    }
}
