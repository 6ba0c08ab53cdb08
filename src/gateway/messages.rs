//! Reply texts. Failure replies name the failure class and nothing else.

use mintwatch_core::launch::{FailureReason, LaunchRequest};

pub(super) fn launched(request: &LaunchRequest, address: &str) -> String {
    format!(
        "${} ({}) is live.\n\nToken address: {address}",
        request.symbol, request.name
    )
}

pub(super) fn failed(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::NoImage => {
            "Couldn't launch this one: no image found. Attach an image to your post and try again."
        }
        FailureReason::Exhausted => {
            "Couldn't launch this one: a service we depend on is unavailable right now."
        }
        FailureReason::Rejected => "Couldn't launch this one: the request was rejected.",
        FailureReason::Ambiguous => {
            "We couldn't confirm whether this launch went through. It has been flagged for review."
        }
    }
}
