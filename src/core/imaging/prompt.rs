use anyhow::Result;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::core::errors::PipelineError;
use crate::core::llm::{self, ChatMessage, LlmProvider, TextRequest};

/// Visual styles and their relative sampling weights.
pub const STYLES: &[(&str, u32)] = &[
    ("soft anime illustration", 5),
    ("warm watercolor painting", 4),
    ("children's picture-book illustration", 3),
    ("natural-light photograph", 3),
    ("flat vector illustration", 2),
    ("ukiyo-e woodblock print", 1),
    ("cozy pixel art", 1),
];

pub const GENDERS: &[&str] = &["man", "woman"];

/// Per-call random choices that shape the image instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptParams {
    pub style: &'static str,
    pub gender: &'static str,
}

impl PromptParams {
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let style = match WeightedIndex::new(STYLES.iter().map(|(_, w)| *w)) {
            Ok(dist) => STYLES[dist.sample(rng)].0,
            Err(_) => STYLES[0].0,
        };
        let gender = GENDERS.choose(rng).copied().unwrap_or(GENDERS[0]);
        Self { style, gender }
    }
}

pub fn build_instruction(params: &PromptParams) -> String {
    format!(
        "You write prompts for an image generator. Given a short sentence, describe one \
         clear, concrete scene that illustrates it so a language learner can guess the \
         meaning from the picture alone.\n\
         - Art style: {style}.\n\
         - If the sentence involves a person whose gender it does not specify, depict a {gender}.\n\
         - Do not include any text, letters, captions or speech bubbles in the image.\n\
         - Answer with the image prompt only, in one paragraph of plain English.",
        style = params.style,
        gender = params.gender,
    )
}

pub struct ImagePromptDeriver {
    provider: Arc<dyn LlmProvider>,
    model: String,
    reasoning_effort: Option<String>,
}

impl ImagePromptDeriver {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: String,
        reasoning_effort: Option<String>,
    ) -> Self {
        Self {
            provider,
            model,
            reasoning_effort,
        }
    }

    /// Derive a prompt with a fresh random style and gender draw.
    pub async fn derive(&self, sentence: &str) -> Result<String> {
        let params = {
            let mut rng = rand::thread_rng();
            PromptParams::sample(&mut rng)
        };
        self.derive_with(sentence, &params).await
    }

    pub async fn derive_with(&self, sentence: &str, params: &PromptParams) -> Result<String> {
        let request = TextRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(build_instruction(params)),
                ChatMessage::user(sentence),
            ],
            reasoning_effort: self.reasoning_effort.clone(),
        };
        let response = self.provider.respond(&request).await?;
        if let Some(message) = llm::error_message(&response) {
            return Err(PipelineError::PromptGeneration(message).into());
        }
        let text = llm::extract_text(&response).trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::PromptGeneration(format!(
                "empty prompt for sentence: {}",
                sentence
            ))
            .into());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct FixedProvider {
        body: Value,
        last: Mutex<Option<TextRequest>>,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn respond(&self, request: &TextRequest) -> Result<Value> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(self.body.clone())
        }
    }

    fn provider(body: Value) -> Arc<FixedProvider> {
        Arc::new(FixedProvider {
            body,
            last: Mutex::new(None),
        })
    }

    #[test]
    fn seeded_sampling_is_deterministic() {
        let a = PromptParams::sample(&mut StdRng::seed_from_u64(7));
        let b = PromptParams::sample(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(STYLES.iter().any(|(s, _)| *s == a.style));
        assert!(GENDERS.contains(&a.gender));
    }

    #[test]
    fn sampling_covers_several_styles() {
        let mut rng = StdRng::seed_from_u64(1);
        let seen: std::collections::HashSet<&str> =
            (0..200).map(|_| PromptParams::sample(&mut rng).style).collect();
        assert!(seen.len() > 3);
    }

    #[test]
    fn instruction_mentions_style_and_gender() {
        let params = PromptParams {
            style: "cozy pixel art",
            gender: "woman",
        };
        let text = build_instruction(&params);
        assert!(text.contains("Art style: cozy pixel art."));
        assert!(text.contains("depict a woman"));
    }

    #[tokio::test]
    async fn derive_returns_trimmed_text_with_low_effort() {
        let p = provider(json!({"output_text": "  A cat sleeping on a sofa.  "}));
        let deriver = ImagePromptDeriver::new(p.clone(), "m".to_string(), Some("low".to_string()));
        let params = PromptParams {
            style: "warm watercolor painting",
            gender: "man",
        };
        let out = deriver.derive_with("The cat is sleeping.", &params).await.unwrap();
        assert_eq!(out, "A cat sleeping on a sofa.");

        let req = p.last.lock().unwrap().clone().unwrap();
        assert_eq!(req.reasoning_effort.as_deref(), Some("low"));
        assert!(req.messages[0].content.contains("warm watercolor painting"));
        assert_eq!(req.messages[1].content, "The cat is sleeping.");
    }

    #[tokio::test]
    async fn empty_text_is_prompt_error() {
        let deriver = ImagePromptDeriver::new(provider(json!({"output": []})), "m".to_string(), None);
        let err = deriver.derive("Hello.").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::PromptGeneration(_))
        ));
    }

    #[tokio::test]
    async fn error_envelope_is_prompt_error() {
        let deriver = ImagePromptDeriver::new(
            provider(json!({"error": {"message": "bad key"}})),
            "m".to_string(),
            None,
        );
        let err = deriver.derive("Hello.").await.unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::PromptGeneration(msg)) => assert_eq!(msg, "bad key"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
