use tokio_util::sync::CancellationToken;

use crate::common::phys::PhysLayer;
use crate::decode::FrameDecodeLevel;
use crate::server::dispatch::{ReplySink, Request};

/// Serial reads are at most this large; an RTU frame always fits
pub(crate) const READ_BUFFER_SIZE: usize = 512;

/// Reader task for a single serial port. The port is owned by this task for
/// its whole lifetime and closed when the task drops it.
pub(crate) struct PortTask {
    phys: PhysLayer,
    decode: FrameDecodeLevel,
    requests: tokio::sync::mpsc::Sender<Request>,
    shutdown: CancellationToken,
}

impl PortTask {
    pub(crate) fn new(
        phys: PhysLayer,
        decode: FrameDecodeLevel,
        requests: tokio::sync::mpsc::Sender<Request>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            phys,
            decode,
            requests,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            let count = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown");
                    return;
                }
                result = self.phys.read(&mut buffer) => {
                    match result {
                        Ok(count) => count,
                        Err(err) => {
                            tracing::warn!("serial read error: {}", err);
                            return;
                        }
                    }
                }
            };

            if count == 0 {
                continue;
            }

            // the stream is not framed by length, so a frame that fails to
            // parse or validate is dropped and the loop resumes
            let frame = match crate::serial::frame::parse(&buffer[..count], self.decode) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!("discarding serial frame: {}", err);
                    continue;
                }
            };

            let (reply, response) = ReplySink::new();
            let request = Request::new(frame, reply);

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown");
                    return;
                }
                result = self.requests.send(request) => {
                    if result.is_err() {
                        return;
                    }
                }
            }

            match response.await {
                Ok(bytes) => {
                    if let Err(err) = self.phys.write(&bytes).await {
                        tracing::warn!("serial write error: {}", err);
                        return;
                    }
                }
                // the dispatcher dropped the request during shutdown
                Err(_) => return,
            }
        }
    }
}
