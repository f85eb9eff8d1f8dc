//! Markdown rendering for post bodies
//!
//! `render_markdown` is the only producer of `body_html`. It is a pure
//! function of its input: Markdown is parsed with pulldown-cmark, bare URLs in
//! plain text become links, and the resulting HTML is cut down to a fixed tag
//! allow-list by ammonia (disallowed tags are stripped, their text kept).

use std::collections::HashSet;

use ammonia::Builder;
use linkify::{LinkFinder, LinkKind};
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream};

/// Tags that survive sanitizing
pub const ALLOWED_TAGS: [&str; 17] = [
    "a",
    "abbr",
    "acronym",
    "b",
    "blockquote",
    "code",
    "em",
    "i",
    "li",
    "ol",
    "pre",
    "strong",
    "ul",
    "h1",
    "h2",
    "h3",
    "p",
];

/// Render a Markdown body to sanitized HTML
pub fn render_markdown(body: &str) -> String {
    let parser = Parser::new_ext(body, Options::ENABLE_STRIKETHROUGH);
    // Merged so a URL is never split across adjacent text events
    let events = autolink(TextMergeStream::new(parser));

    let mut unsafe_html = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut unsafe_html, events.into_iter());

    sanitizer().clean(&unsafe_html).to_string()
}

fn sanitizer() -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect::<HashSet<_>>())
        .link_rel(Some("nofollow"));
    builder
}

/// Split text events outside links and code blocks so bare URLs become links
fn autolink<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);

    let mut out = Vec::new();
    let mut link_depth = 0usize;
    let mut code_depth = 0usize;

    for event in events {
        match &event {
            Event::Start(Tag::Link { .. }) => link_depth += 1,
            Event::End(TagEnd::Link) => link_depth = link_depth.saturating_sub(1),
            Event::Start(Tag::CodeBlock(_)) => code_depth += 1,
            Event::End(TagEnd::CodeBlock) => code_depth = code_depth.saturating_sub(1),
            // Raw `<a ...>` in the source opens a link pulldown doesn't see as one
            Event::InlineHtml(html) => link_depth = raw_anchor_depth(html, link_depth),
            Event::Text(text)
                if link_depth == 0 && code_depth == 0 && finder.links(text).next().is_some() =>
            {
                for span in finder.spans(text) {
                    let piece = span.as_str().to_string();
                    match span.kind() {
                        Some(LinkKind::Url) => {
                            out.push(Event::Start(Tag::Link {
                                link_type: LinkType::Autolink,
                                dest_url: CowStr::from(piece.clone()),
                                title: CowStr::Borrowed(""),
                                id: CowStr::Borrowed(""),
                            }));
                            out.push(Event::Text(CowStr::from(piece)));
                            out.push(Event::End(TagEnd::Link));
                        }
                        _ => out.push(Event::Text(CowStr::from(piece))),
                    }
                }
                continue;
            }
            _ => {}
        }
        out.push(event);
    }

    out
}

/// Track `<a>`/`</a>` tags inside a raw HTML fragment
fn raw_anchor_depth(html: &str, mut depth: usize) -> usize {
    let ends_name = |rest: &str| rest.starts_with(|c: char| c == '>' || c.is_whitespace());
    for tag in html.split('<').skip(1) {
        let tag = tag.to_ascii_lowercase();
        if let Some(rest) = tag.strip_prefix("/a") {
            if ends_name(rest) {
                depth = depth.saturating_sub(1);
            }
        } else if let Some(rest) = tag.strip_prefix('a') {
            if ends_name(rest) {
                depth += 1;
            }
        }
    }
    depth
}
