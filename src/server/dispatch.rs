use tokio_util::sync::CancellationToken;

use crate::bank::RegisterBank;
use crate::common::frame::Frame;
use crate::exception::ExceptionCode;
use crate::server::functions;
use crate::server::FunctionHandler;

/// A decoded frame plus the write-side handle of the originating
/// connection or serial port
pub(crate) struct Request {
    pub(crate) frame: Frame,
    pub(crate) reply: ReplySink,
}

impl Request {
    pub(crate) fn new(frame: Frame, reply: ReplySink) -> Self {
        Request { frame, reply }
    }
}

/// One-shot reply channel back to the reader that enqueued the request.
/// The reader writes the bytes on its own socket/port, which keeps traffic
/// on a single connection strictly serialized.
pub(crate) struct ReplySink {
    tx: tokio::sync::oneshot::Sender<Vec<u8>>,
}

impl ReplySink {
    pub(crate) fn new() -> (Self, tokio::sync::oneshot::Receiver<Vec<u8>>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        (ReplySink { tx }, rx)
    }

    pub(crate) fn send(self, bytes: Vec<u8>) {
        // the connection may already be gone, in which case the response is discarded
        let _ = self.tx.send(bytes);
    }
}

/// Handlers for all 256 function codes, populated with the eight standard
/// data-access functions and overridable per slot
pub(crate) struct FunctionTable {
    handlers: [Option<FunctionHandler>; 256],
}

impl FunctionTable {
    pub(crate) fn standard() -> Self {
        let mut table = FunctionTable {
            handlers: std::array::from_fn(|_| None),
        };
        table.set(functions::codes::READ_COILS, Box::new(functions::read_coils));
        table.set(
            functions::codes::READ_DISCRETE_INPUTS,
            Box::new(functions::read_discrete_inputs),
        );
        table.set(
            functions::codes::READ_HOLDING_REGISTERS,
            Box::new(functions::read_holding_registers),
        );
        table.set(
            functions::codes::READ_INPUT_REGISTERS,
            Box::new(functions::read_input_registers),
        );
        table.set(
            functions::codes::WRITE_SINGLE_COIL,
            Box::new(functions::write_single_coil),
        );
        table.set(
            functions::codes::WRITE_SINGLE_REGISTER,
            Box::new(functions::write_single_register),
        );
        table.set(
            functions::codes::WRITE_MULTIPLE_COILS,
            Box::new(functions::write_multiple_coils),
        );
        table.set(
            functions::codes::WRITE_MULTIPLE_REGISTERS,
            Box::new(functions::write_multiple_registers),
        );
        table
    }

    pub(crate) fn set(&mut self, code: u8, handler: FunctionHandler) {
        self.handlers[code as usize] = Some(handler);
    }

    fn get_mut(&mut self, code: u8) -> Option<&mut FunctionHandler> {
        self.handlers[code as usize].as_mut()
    }
}

/// The single consumer of the request channel. Owns the register bank
/// exclusively, so handlers never contend for it.
pub(crate) struct Dispatcher {
    functions: FunctionTable,
    bank: Box<dyn RegisterBank>,
}

impl Dispatcher {
    pub(crate) fn new(functions: FunctionTable, bank: Box<dyn RegisterBank>) -> Self {
        Self { functions, bank }
    }

    /// Compute the response frame for a request frame
    pub(crate) fn handle(&mut self, frame: &Frame) -> Frame {
        let result = match self.functions.get_mut(frame.function()) {
            Some(handler) => handler(self.bank.as_mut(), frame),
            None => {
                tracing::warn!("received unknown function code: {:#04X}", frame.function());
                Err(ExceptionCode::IllegalFunction)
            }
        };

        match result {
            Ok(data) => frame.reply(data),
            Err(ex) => frame.exception_reply(ex),
        }
    }

    pub(crate) async fn run(
        &mut self,
        requests: &mut tokio::sync::mpsc::Receiver<Request>,
        shutdown: &CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("dispatcher shutdown");
                    return;
                }
                request = requests.recv() => {
                    // all producers dropping their senders also ends the loop
                    let Some(request) = request else { return };
                    let response = self.handle(&request.frame);
                    match response.serialize() {
                        Ok(bytes) => request.reply.send(bytes),
                        Err(err) => tracing::error!("failed to serialize response: {}", err),
                    }
                }
            }
        }
    }
}
