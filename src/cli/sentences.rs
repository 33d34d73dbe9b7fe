use anyhow::Result;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::generator::TextGenerator;
use crate::core::llm::providers::OpenAiProvider;
use crate::core::pipeline::sentences::run_sentence_pipeline;
use crate::core::terminal::{GuideSection, print_info, print_step, print_success};

pub(super) async fn run(config: &Config) -> Result<()> {
    let api_key = config.require_openai_key()?;
    let provider = Arc::new(OpenAiProvider::new(api_key, config.openai_base_url.clone()));
    let generator = TextGenerator::new(
        provider,
        config.text_model.clone(),
        Some(config.reasoning_effort.clone()),
    );

    print_step(&format!(
        "Generating sentences into {}",
        config.sentences_path.display()
    ));
    let summary = run_sentence_pipeline(&config.sentence_run(), &generator).await?;

    if summary.window.is_empty() {
        print_info("Nothing to generate: every row in the window is already stored.");
    } else {
        print_success(&format!("Generated {} sentences", summary.generated));
    }
    GuideSection::new("Sentence Run")
        .status("Vocabulary rows", &summary.total_rows.to_string())
        .status("Rows stored before run", &summary.existing_rows.to_string())
        .status(
            "Window",
            &format!(
                "{}..={} ({} rows)",
                summary.window.start,
                summary.window.last,
                summary.window.len()
            ),
        )
        .status("Generated", &summary.generated.to_string())
        .print();
    Ok(())
}
