// tests/ingest_normalize.rs
use market_news_intel::ingest::{content_id, normalize_headline, normalize_text, parse_articles_jsonl};

#[test]
fn empty_is_ok() {
    assert_eq!(normalize_text(""), "");
    assert_eq!(normalize_headline(""), "");
}

#[test]
fn strips_html_and_unescapes() {
    let s = "<p>Hello&nbsp;<b>world</b> &ldquo;ok&rdquo;</p>";
    let n = normalize_text(s);
    assert_eq!(n, r#"Hello world "ok""#);
}

#[test]
fn folds_whitespace_and_nbsp() {
    let s = "A\u{00A0}\n\tB   C";
    let n = normalize_text(s);
    assert_eq!(n, "A B C");
}

#[test]
fn body_keeps_sentence_punctuation() {
    assert_eq!(normalize_text("Profit rose. Shares fell!"), "Profit rose. Shares fell!");
    assert_eq!(normalize_headline("Shares fell!"), "Shares fell");
}

#[test]
fn content_id_is_stable_and_field_sensitive() {
    let a = content_id("Mint", "2024-05-02T09:15:00+00:00", "Wipro wins deal");
    assert_eq!(a, content_id("Mint", "2024-05-02T09:15:00+00:00", "Wipro wins deal"));
    assert_ne!(a, content_id("ET", "2024-05-02T09:15:00+00:00", "Wipro wins deal"));
    // Field boundaries matter.
    assert_ne!(content_id("ab", "c", "d"), content_id("a", "bc", "d"));
}

#[test]
fn records_are_normalized_on_load() {
    let line = r#"{"id":" n1 ","source":" Mint ","published_at":"2024-05-02T09:15:00Z","title":"Infosys &amp; TCS rally!","body":"<p>IT stocks gained.</p>","url":"","sectors":["IT","IT"]}"#;
    let out = parse_articles_jsonl(line);
    let a = &out.articles[0];
    assert_eq!(a.id, "n1");
    assert_eq!(a.source, "Mint");
    assert_eq!(a.headline, "Infosys & TCS rally");
    assert_eq!(a.body, "IT stocks gained.");
    assert_eq!(a.url, None);
    assert_eq!(a.tags.sectors, vec!["IT"]);
}
