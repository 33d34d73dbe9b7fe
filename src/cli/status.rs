use anyhow::Result;
use console::style;

use crate::core::config::Config;
use crate::core::pipeline::images::image_path;
use crate::core::pipeline::sentences::resume_start;
use crate::core::store::read_records;
use crate::core::terminal::{GuideSection, print_warn};
use crate::core::vocab::load_vocabulary;

pub(super) fn run(config: &Config) -> Result<()> {
    let vocab_rows = if config.vocab_path.exists() {
        load_vocabulary(&config.vocab_path)?.len()
    } else {
        print_warn(&format!(
            "Vocabulary file {} not found",
            config.vocab_path.display()
        ));
        0
    };
    let records = read_records(&config.sentences_path)?;
    let next = resume_start(config.start_index, records.len());
    let images = records
        .iter()
        .filter(|r| image_path(&config.images_dir, r.id, &config.image_ext).exists())
        .count();

    let done = next > vocab_rows;
    let next_row = if done {
        style("complete").green().bold().to_string()
    } else {
        next.to_string()
    };
    let hint = if !done {
        format!("Run {} to continue.", style("kotodeck sentences").cyan().bold())
    } else if images < records.len() {
        format!("Run {} to fill in images.", style("kotodeck images").cyan().bold())
    } else {
        "Nothing left to do.".to_string()
    };

    GuideSection::new("Deck Status")
        .status(
            "Vocabulary",
            &format!("{} rows ({})", vocab_rows, config.vocab_path.display()),
        )
        .status(
            "Sentences",
            &format!(
                "{} rows ({})",
                records.len(),
                config.sentences_path.display()
            ),
        )
        .status("Next row", &next_row)
        .status(
            "Images",
            &format!(
                "{} present, {} missing ({})",
                images,
                records.len() - images,
                config.images_dir.display()
            ),
        )
        .blank()
        .info(&hint)
        .print();
    Ok(())
}
