//! Ticket card rendering.
//!
//! Pure projections of a ticket and its event into an SVG card and a
//! printable HTML page. The QR area carries the verification payload as
//! text; scanners at the door use the access code or the barcode digits.

use crate::types::{DigitalTicket, Event};
use std::fmt::Write as _;

const CARD_WIDTH: u32 = 600;
const CARD_HEIGHT: u32 = 320;
const BAR_WIDTH: u32 = 3;
const BAR_GAP: u32 = 2;

/// Rendered forms of one ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketArtifact {
    /// Card image
    pub svg: String,
    /// Print page
    pub html: String,
}

/// A file offered for download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketFile {
    /// Suggested file name
    pub file_name: String,
    /// MIME type
    pub content_type: &'static str,
    /// File contents
    pub bytes: Vec<u8>,
}

/// One barcode bar, in card coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bar {
    /// Left edge
    pub x: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// Bars for a digit string. Even digits draw tall bars, odd digits short
/// ones, and the digit value adds a little height so neighbours differ.
#[must_use]
pub fn barcode_bars(barcode: &str) -> Vec<Bar> {
    barcode
        .chars()
        .filter_map(|c| c.to_digit(10))
        .zip(0_u32..)
        .map(|(digit, i)| Bar {
            x: i * (BAR_WIDTH + BAR_GAP),
            width: BAR_WIDTH,
            height: if digit % 2 == 0 { 40 } else { 28 } + digit * 2,
        })
        .collect()
}

/// Escape text for HTML and SVG bodies and attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Ticket id reduced to characters that are safe in a file name.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Render both artifacts.
#[must_use]
pub fn render(ticket: &DigitalTicket, event: &Event) -> TicketArtifact {
    TicketArtifact {
        svg: render_svg(ticket, event),
        html: render_print_html(ticket, event),
    }
}

/// The SVG card as a downloadable file.
#[must_use]
pub fn download(ticket: &DigitalTicket, event: &Event) -> TicketFile {
    TicketFile {
        file_name: format!("ticket-{}.svg", file_safe(ticket.id.as_str())),
        content_type: "image/svg+xml",
        bytes: render_svg(ticket, event).into_bytes(),
    }
}

/// The print page.
#[must_use]
pub fn print(ticket: &DigitalTicket, event: &Event) -> String {
    render_print_html(ticket, event)
}

fn render_svg(ticket: &DigitalTicket, event: &Event) -> String {
    let mut svg = String::new();
    let _ = write!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{CARD_WIDTH}" height="{CARD_HEIGHT}" viewBox="0 0 {CARD_WIDTH} {CARD_HEIGHT}">"##
    );
    let _ = write!(
        svg,
        r##"<rect width="{CARD_WIDTH}" height="{CARD_HEIGHT}" rx="16" fill="#1e1b4b"/>"##
    );
    let _ = write!(
        svg,
        r##"<text x="24" y="48" font-family="sans-serif" font-size="24" font-weight="bold" fill="#ffffff">{}</text>"##,
        escape_html(&event.title)
    );
    let _ = write!(
        svg,
        r##"<text x="24" y="80" font-family="sans-serif" font-size="14" fill="#c7d2fe">{} {} · {}</text>"##,
        event.date.format("%d/%m/%Y"),
        event.time.format("%H:%M"),
        escape_html(&event.location)
    );
    let _ = write!(
        svg,
        r##"<text x="24" y="120" font-family="monospace" font-size="16" fill="#ffffff">{} · {} x{}</text>"##,
        escape_html(ticket.id.as_str()),
        ticket.ticket_type,
        ticket.quantity
    );
    let _ = write!(
        svg,
        r##"<text x="24" y="150" font-family="monospace" font-size="14" fill="#a5b4fc">ACCESS CODE {}</text>"##,
        escape_html(&ticket.access_code)
    );
    if ticket.used {
        svg.push_str(
            r##"<text x="24" y="180" font-family="sans-serif" font-size="14" font-weight="bold" fill="#f87171">USED</text>"##,
        );
    }

    let _ = write!(
        svg,
        r##"<rect x="440" y="24" width="136" height="136" fill="#ffffff"/><text x="508" y="96" font-family="monospace" font-size="8" text-anchor="middle" fill="#1e1b4b">{}</text>"##,
        escape_html(&ticket.qr_code)
    );

    let baseline = CARD_HEIGHT - 40;
    svg.push_str(r##"<g fill="#ffffff">"##);
    for bar in barcode_bars(&ticket.barcode) {
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}"/>"#,
            24 + bar.x,
            baseline - bar.height,
            bar.width,
            bar.height
        );
    }
    svg.push_str("</g>");
    let _ = write!(
        svg,
        r##"<text x="24" y="{}" font-family="monospace" font-size="12" fill="#ffffff">{}</text>"##,
        baseline + 18,
        escape_html(&ticket.barcode)
    );

    svg.push_str("</svg>");
    svg
}

fn render_print_html(ticket: &DigitalTicket, event: &Event) -> String {
    let title = escape_html(&event.title);
    let status = if ticket.used { "Used" } else { "Valid" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Ticket {id} - {title}</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
.ticket {{ border: 2px dashed #1e1b4b; padding: 1.5rem; max-width: 640px; }}
.code {{ font-family: monospace; font-size: 1.25rem; }}
@media print {{ .no-print {{ display: none; }} }}
</style>
</head>
<body>
<div class="ticket">
<h1>{title}</h1>
<p>{date} {time} &middot; {location}</p>
<p>Ticket <span class="code">{id}</span> &middot; {ticket_type} &times; {quantity}</p>
<p>Access code <span class="code">{access_code}</span></p>
<p>Barcode <span class="code">{barcode}</span></p>
<p>Verify at <a href="{qr}">{qr}</a></p>
<p>Purchased {purchased} &middot; {status}</p>
{svg}
</div>
<button class="no-print" onclick="window.print()">Print</button>
</body>
</html>
"#,
        id = escape_html(ticket.id.as_str()),
        date = event.date.format("%d/%m/%Y"),
        time = event.time.format("%H:%M"),
        location = escape_html(&event.location),
        ticket_type = ticket.ticket_type,
        quantity = ticket.quantity,
        access_code = escape_html(&ticket.access_code),
        barcode = escape_html(&ticket.barcode),
        qr = escape_html(&ticket.qr_code),
        purchased = ticket.purchase_date.format("%d/%m/%Y %H:%M"),
        svg = render_svg(ticket, event),
    )
}
