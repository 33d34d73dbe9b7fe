use anyhow::Result;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::imaging::{ImagePromptDeriver, ImageRenderer};
use crate::core::llm::providers::OpenAiProvider;
use crate::core::pipeline::images::{
    RenderingRunner, plan_image_jobs, record_window, run_image_jobs,
};
use crate::core::store::read_records;
use crate::core::terminal::{GuideSection, print_info, print_step, print_success};

pub(super) async fn run(config: &Config) -> Result<()> {
    let records = read_records(&config.sentences_path)?;
    let window = record_window(
        records.len(),
        config.image_start_index,
        config.image_row_limit,
    );
    let jobs = plan_image_jobs(&records, &config.images_dir, &config.image_ext, window);
    if jobs.is_empty() {
        print_info("No images to generate.");
        return Ok(());
    }

    let api_key = config.require_openai_key()?;
    let token = config.require_replicate_token()?;
    let provider = Arc::new(OpenAiProvider::new(api_key, config.openai_base_url.clone()));
    let runner = Arc::new(RenderingRunner {
        deriver: ImagePromptDeriver::new(
            provider,
            config.text_model.clone(),
            Some(config.image_prompt_effort.clone()),
        ),
        renderer: ImageRenderer::new(
            token,
            config.replicate_base_url.clone(),
            config.render_settings(),
        )?,
    });

    print_step(&format!(
        "Rendering {} images into {}",
        jobs.len(),
        config.images_dir.display()
    ));
    let summary = run_image_jobs(jobs, runner, config.concurrency).await?;

    print_success(&format!("Wrote {} images", summary.written));
    GuideSection::new("Image Run")
        .status("Stored sentences", &records.len().to_string())
        .status(
            "Window",
            &format!("{}..={} ({} rows)", window.start, window.last, window.len()),
        )
        .status("Planned", &summary.planned.to_string())
        .status("Workers", &summary.workers.to_string())
        .print();
    Ok(())
}
