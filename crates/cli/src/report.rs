//! Console output for command results.

use engine::{RunReport, SampleReport};
use pipeline::{Catalog, ItemFailure, StatusReport};

/// Rough token cost of one generated interpretation.
pub const TOKENS_PER_ITEM: usize = 500;

/// How many failures are listed individually before summarising.
const MAX_LISTED_FAILURES: usize = 20;

pub fn print_status(status: &StatusReport) {
    println!("{:<24} {:<12} {:>9} {:>9}", "dimension", "category", "present", "missing");
    for row in &status.dimensions {
        let marker = if row.is_complete() { "✓" } else { " " };
        println!(
            "{:<24} {:<12} {:>9} {:>9} {marker}",
            row.dimension.as_str(),
            row.category,
            row.present,
            row.missing()
        );
    }
    println!();
    println!(
        "complete dimensions: {}/{}",
        status.complete_dimensions(),
        status.dimensions.len()
    );
    print_totals(status);
    if status.orphaned > 0 {
        println!("orphaned records (not in catalog): {}", status.orphaned);
    }
    if status.failed > 0 {
        println!("items that failed on their last run: {}", status.failed);
    }
}

fn print_totals(status: &StatusReport) {
    println!(
        "generated: {}  expected: {}  still missing: {}",
        status.generated,
        status.expected,
        status.still_missing()
    );
}

pub fn print_run(report: &RunReport) {
    if report.nothing_to_do() {
        println!("Nothing to do: every requested item is already generated.");
        print_totals(&report.status);
        return;
    }

    println!(
        "run {}: requested {}, added {}, replaced {}, failed {}",
        report.run_id,
        report.requested,
        report.added,
        report.replaced,
        report.failures.len()
    );
    if report.lost > 0 {
        println!("tasks lost to panics: {}", report.lost);
    }
    if report.was_cancelled() {
        println!(
            "interrupted: {} item(s) not generated; progress so far is saved",
            report.cancelled
        );
    }
    print_failures(&report.failures);
    print_totals(&report.status);
}

pub fn print_sample(report: &SampleReport, location: &str) {
    println!(
        "samples: requested {}, generated {}, failed {} -> {location}",
        report.requested,
        report.generated,
        report.failures.len()
    );
    if report.cancelled > 0 {
        println!("interrupted: {} sample(s) not generated", report.cancelled);
    }
    print_failures(&report.failures);
}

fn print_failures(failures: &[ItemFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("failed items (retried on the next run):");
    for failure in failures.iter().take(MAX_LISTED_FAILURES) {
        println!("  - {failure}");
    }
    if failures.len() > MAX_LISTED_FAILURES {
        println!("  ... and {} more", failures.len() - MAX_LISTED_FAILURES);
    }
}

pub fn print_cards(catalog: &Catalog, limit: Option<usize>) {
    let cards = catalog.all_cards();
    let shown = limit.unwrap_or(cards.len()).min(cards.len());
    for card in &cards[..shown] {
        println!("{:<16} {:<4} {}", card.name.as_str(), card.direction.label(), card.summary);
    }
    if shown < cards.len() {
        println!("... {} of {} cards shown", shown, cards.len());
    } else {
        println!("{} cards", cards.len());
    }
}

pub fn print_dimensions(catalog: &Catalog) {
    for dimension in catalog.all_dimensions() {
        let aspect = match (&dimension.aspect, dimension.aspect_type) {
            (Some(aspect), Some(n)) => format!("{aspect} #{n}"),
            (Some(aspect), None) => aspect.clone(),
            (None, Some(n)) => format!("#{n}"),
            (None, None) => String::new(),
        };
        println!(
            "{:<24} {:<12} {:<12} {}",
            dimension.name.as_str(),
            dimension.category,
            aspect,
            dimension.description
        );
    }
    println!("{} dimensions", catalog.all_dimensions().len());
}

/// One-line cost estimate shown before generating `items` work items.
pub fn estimate(items: usize, provider: &str, model: &str) -> String {
    format!(
        "About to generate {items} item(s) with {provider}/{model}: ~{} tokens.",
        items * TOKENS_PER_ITEM
    )
}
