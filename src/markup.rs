//! Markdown rendering for posts and private messages.
//!
//! Stored text is always the raw markdown the user typed. HTML is produced on the
//! way out: CommonMark (plus tables and strikethrough) through `pulldown-cmark`,
//! then `ammonia` strips anything that could run script or break out of the page.

use pulldown_cmark::{html, Options, Parser};

const LINK_REL: &str = "noopener noreferrer nofollow";

/// Render untrusted markdown into sanitized HTML.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options);
    let mut unsafe_html = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut unsafe_html, parser);

    sanitize_html(&unsafe_html)
}

/// Run already-rendered HTML through the allow-list sanitizer.
pub fn sanitize_html(raw: &str) -> String {
    ammonia::Builder::default()
        .link_rel(Some(LINK_REL))
        .clean(raw)
        .to_string()
}
