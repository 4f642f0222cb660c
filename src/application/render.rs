//! Markdown pipeline for post bodies: Comrak rendering followed by Ammonia
//! sanitisation.
//!
//! Post content originates from a trusted CMS, but everything that reaches a
//! template still goes through the sanitizer.

use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use comrak::Options;
use once_cell::sync::Lazy;

pub struct MarkdownRenderService {
    options: Options<'static>,
    sanitizer: AmmoniaBuilder<'static>,
}

impl MarkdownRenderService {
    fn new() -> Self {
        Self {
            options: default_options(),
            sanitizer: build_sanitizer(),
        }
    }

    /// Render markdown to sanitized HTML. Deterministic for identical input.
    pub fn render(&self, markdown: &str) -> String {
        let html = comrak::markdown_to_html(markdown, &self.options);
        self.sanitizer.clean(&html).to_string()
    }
}

static RENDER_SERVICE: Lazy<MarkdownRenderService> = Lazy::new(MarkdownRenderService::new);

/// Access the shared render service, initialised on first use.
pub fn render_service() -> &'static MarkdownRenderService {
    &RENDER_SERVICE
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = true;
    render.gfm_quirks = true;

    options
}

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "blockquote",
        "br",
        "code",
        "del",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "img",
        "input",
        "li",
        "ol",
        "p",
        "pre",
        "s",
        "span",
        "strong",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
    ]);
    builder.tags(tags);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_tag_attributes("img", &["src", "alt", "title", "width", "height", "loading"]);

    builder
}
