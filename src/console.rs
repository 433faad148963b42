//! Terminal renderer for scanner events

use crossbeam_channel::Receiver;

use crate::search::{FailureReason, QueryOrigin, SearchOutcome};
use crate::shared::{PresentationEvent, ScannerStatus};

/// Turn one event into the lines a user should see
pub fn render(event: &PresentationEvent) -> Vec<String> {
    match event {
        PresentationEvent::Status(ScannerStatus::InitFailed(reason)) => {
            vec![format!("[status] Init Error: {}", reason)]
        }
        PresentationEvent::Status(ScannerStatus::ScanUnavailable) => {
            vec!["[status] No camera frames; only manual search is available".to_string()]
        }
        PresentationEvent::Status(status) => vec![format!("[status] {}", status)],
        PresentationEvent::CodeDetected(code) => vec![format!("[input] {}", code)],
        PresentationEvent::Searching { origin, .. } => match origin {
            QueryOrigin::Scan => vec!["Searching detected code...".to_string()],
            QueryOrigin::Manual => vec!["Searching...".to_string()],
        },
        PresentationEvent::Outcome { keyword, outcome, .. } => render_outcome(keyword, outcome),
        PresentationEvent::ManualEntryRequested { keyword } => vec![
            format!("Code {} not found.", keyword),
            "Please type a product name instead.".to_string(),
        ],
    }
}

fn render_outcome(keyword: &str, outcome: &SearchOutcome) -> Vec<String> {
    match outcome {
        SearchOutcome::Success {
            products,
            duration_sec,
        } => {
            let mut lines = vec![format!(
                "Found {} results in {}s",
                products.len(),
                duration_sec
            )];
            for product in products {
                let price = if product.is_discounted() {
                    format!("{} (was {})", product.sale_price, product.original_price)
                } else {
                    product.sale_price.clone()
                };
                lines.push(format!("  {}  {}", product.product_name, price));
                lines.push(format!("    {}", product.product_url));
            }
            lines
        }
        SearchOutcome::Empty { .. } => vec![format!("No results for \"{}\"", keyword)],
        SearchOutcome::Failure {
            reason: FailureReason::NetworkError(msg),
        } => vec![format!("Network Error. Please try again. ({})", msg)],
        SearchOutcome::Failure { reason } => vec![reason.to_string()],
    }
}

/// Print events until the channel closes. With `once`, return after the
/// first search outcome.
pub fn run_console(events: Receiver<PresentationEvent>, once: bool) {
    for event in events.iter() {
        for line in render(&event) {
            println!("{}", line);
        }
        if once && matches!(event, PresentationEvent::Outcome { .. }) {
            break;
        }
    }
}
