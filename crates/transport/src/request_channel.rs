use supervisors_types::Request;
use tokio::sync::mpsc;

/// The local push/pull request channel (spec.md §4.5, §6): requests
/// produced by the dispatcher or an external interface are pushed here and
/// pulled by the I/O loop for forwarding onto the internal bus or to the
/// local process manager. Unlike the internal/external buses this never
/// crosses a process boundary, so a plain in-process `mpsc` channel is
/// enough — no framing required.
pub type RequestSender = mpsc::Sender<Request>;
pub type RequestReceiver = mpsc::Receiver<Request>;

const REQUEST_CHANNEL_CAPACITY: usize = 256;

pub fn request_channel() -> (RequestSender, RequestReceiver) {
    mpsc::channel(REQUEST_CHANNEL_CAPACITY)
}
