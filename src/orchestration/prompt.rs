//! Provider prompt and reference image assembly.

use std::sync::Arc;

use crate::core::{GenerationContext, Page};
use crate::providers::ImageRequest;

/// Compose the text prompt for one page.
pub fn build_prompt(page: &Page, context: &GenerationContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(page.kind.directive());
    prompt.push_str("\n\nPage content:\n");
    prompt.push_str(page.content.trim());

    let outline = context.full_outline.trim();
    if !outline.is_empty() {
        prompt.push_str("\n\nFull outline, keep every page visually consistent with it:\n");
        prompt.push_str(outline);
    }

    if let Some(topic) = context
        .user_topic
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        prompt.push_str("\n\nTopic: ");
        prompt.push_str(topic);
    }

    match context.user_images.len() {
        0 => {}
        1 => prompt.push_str("\n\n1 user reference image is attached; follow its style."),
        n => prompt.push_str(&format!(
            "\n\n{} user reference images are attached; follow their style.",
            n
        )),
    }
    prompt
}

/// Reference images in priority order: the page's own image, the user's
/// images, then the style reference unless the page is a cover.
pub fn collect_references(
    page: &Page,
    context: &GenerationContext,
    style_reference: Option<&Arc<Vec<u8>>>,
) -> Vec<Vec<u8>> {
    let mut references = Vec::with_capacity(context.user_images.len() + 2);
    if let Some(own) = &page.reference_image {
        references.push(own.clone());
    }
    references.extend(context.user_images.iter().cloned());
    if let Some(style) = style_reference.filter(|_| !page.is_cover()) {
        references.push(style.as_ref().clone());
    }
    references
}

pub fn build_request(
    page: &Page,
    context: &GenerationContext,
    style_reference: Option<&Arc<Vec<u8>>>,
) -> ImageRequest {
    ImageRequest::new(build_prompt(page, context))
        .with_references(collect_references(page, context, style_reference))
}
