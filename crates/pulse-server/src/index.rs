//! HTML index of every stored metric.

/// Renders the metric listing as a minimal HTML page.
#[must_use]
pub fn render_index(entries: &[(String, String)]) -> String {
    let mut page = String::with_capacity(128 + entries.len() * 32);
    page.push_str("<html><body><h1>Metrics</h1><ul>");
    for (name, value) in entries {
        page.push_str("<li>");
        page.push_str(&escape(name));
        page.push_str(": ");
        page.push_str(&escape(value));
        page.push_str("</li>");
    }
    page.push_str("</ul></body></html>");
    page
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listing_is_still_a_page() {
        let page = render_index(&[]);
        assert!(page.starts_with("<html>"));
        assert!(page.contains("<h1>Metrics</h1>"));
        assert!(page.ends_with("</html>"));
    }

    #[test]
    fn entries_are_listed_in_order() {
        let entries = vec![
            ("a_counter".to_string(), "9".to_string()),
            ("b_gauge".to_string(), "2.5".to_string()),
        ];
        let page = render_index(&entries);
        assert!(page.contains("<li>a_counter: 9</li>"));
        assert!(page.contains("<li>b_gauge: 2.5</li>"));
        assert!(page.find("a_counter").unwrap() < page.find("b_gauge").unwrap());
    }

    #[test]
    fn markup_in_names_is_escaped() {
        let entries = vec![("<script>".to_string(), "1".to_string())];
        let page = render_index(&entries);
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
