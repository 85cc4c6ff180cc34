//! The generic notification dispatcher (push/SMS/etc.) is out of scope;
//! this is the narrow contract the location handler fires into, always
//! from a detached task so a slow or failing notifier can never stall the
//! socket reader (spec §4.F, §5 "cancellation").

use dashcam_protocol::jt808::LocationReport;

pub trait LocationNotifier: Send + Sync + 'static {
    fn notify(&self, identifier: &str, location: &LocationReport);
}

pub struct NoopNotifier;

impl LocationNotifier for NoopNotifier {
    fn notify(&self, _identifier: &str, _location: &LocationReport) {}
}
