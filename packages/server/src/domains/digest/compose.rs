//! Digest email rendering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domains::items::Item;
use crate::domains::users::User;
use crate::kernel::OutboundEmail;

/// Characters of each summary shown in the email.
const SUMMARY_PREVIEW_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestVariant {
    Plain,
    WithPodcast,
}

pub fn subject(date: NaiveDate, items: usize) -> String {
    let noun = if items == 1 { "item" } else { "items" };
    format!("Your briefing for {}: {} {}", date.format("%B %-d"), items, noun)
}

/// Escapes text for HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn preview(item: &Item) -> String {
    let summary = item.summary.as_deref().unwrap_or("").trim();
    match summary.char_indices().nth(SUMMARY_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}…", summary[..idx].trim_end()),
        None => summary.to_string(),
    }
}

fn display_title(item: &Item) -> &str {
    if item.title.trim().is_empty() {
        &item.url
    } else {
        &item.title
    }
}

/// Renders the digest. With a podcast URL the email leads with a listen link.
pub fn compose_digest(
    user: &User,
    items: &[Item],
    podcast_url: Option<&str>,
    date: NaiveDate,
) -> (OutboundEmail, DigestVariant) {
    let variant = match podcast_url {
        Some(_) => DigestVariant::WithPodcast,
        None => DigestVariant::Plain,
    };
    let greeting = format!("Hi {},", user.greeting_name());

    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"font-family: sans-serif;\">");
    html.push_str(&format!("<p>{}</p>", escape_html(&greeting)));
    html.push_str(&format!(
        "<p>Here is what you saved yesterday and have not read yet ({}).</p>",
        items.len()
    ));

    let mut text = format!(
        "{}\n\nHere is what you saved yesterday and have not read yet ({}).\n\n",
        greeting,
        items.len()
    );

    if let Some(url) = podcast_url {
        html.push_str(&format!(
            "<p><a href=\"{}\">Listen to today's audio briefing</a></p>",
            escape_html(url)
        ));
        text.push_str(&format!("Listen to today's audio briefing: {}\n\n", url));
    }

    html.push_str("<ul>");
    for item in items {
        let title = display_title(item);
        let summary = preview(item);
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a>",
            escape_html(&item.url),
            escape_html(title)
        ));
        if !summary.is_empty() {
            html.push_str(&format!("<br>{}", escape_html(&summary)));
        }
        html.push_str("</li>");

        text.push_str(&format!("- {}\n  {}\n", title, item.url));
        if !summary.is_empty() {
            text.push_str(&format!("  {}\n", summary));
        }
    }
    html.push_str("</ul></body></html>");

    let email = OutboundEmail {
        to: vec![user.email.trim().to_string()],
        subject: subject(date, items.len()),
        html_body: html,
        text_body: text,
    };
    (email, variant)
}
