use stepwise::{JdbClassifier, LineClassifier};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::output::{Record, line_class_json, print_record};

/// Reads jdb output from stdin and prints how each line is understood.
pub async fn execute() -> anyhow::Result<()> {
	let classifier = JdbClassifier;
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut count = 0usize;

	while let Some(line) = lines.next_line().await? {
		let class = classifier.classify(&line);
		print_record(&Record::Classified {
			line: &line,
			class: line_class_json(&class),
		})?;
		count += 1;
	}
	tracing::info!(lines = count, "Classified stdin");
	Ok(())
}
