//! Minimal TwiML rendering for webhook replies.

/// Escape the five XML special characters.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a single-message TwiML response document.
pub fn message_response(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(body)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_message_document() {
        let xml = message_response("What's your age?");
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
             <Message>What&apos;s your age?</Message></Response>"
        );
    }

    #[test]
    fn escapes_markup_in_body() {
        let xml = message_response("a < b & \"c\"");
        assert!(xml.contains("a &lt; b &amp; &quot;c&quot;"));
        assert!(!xml.contains("a < b"));
    }
}
