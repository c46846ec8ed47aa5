//! Overlay styling, injected once per document.

pub use insights_core::presenter::OVERLAY_CLASS;

pub const STYLE_ELEMENT_ID: &str = "job-insights-style";

pub const STYLES: &str = r#"
.job-insights-overlay {
    position: fixed;
    z-index: 2147483000;
    min-width: 220px;
    max-width: 320px;
    padding: 12px 14px;
    border-radius: 8px;
    background: #ffffff;
    color: #1d2226;
    box-shadow: 0 4px 16px rgba(0, 0, 0, 0.18);
    font: 13px/1.4 -apple-system, system-ui, "Segoe UI", Roboto, sans-serif;
}
.job-insights-overlay .job-insights-header {
    margin: 0 24px 6px 0;
    font-weight: 600;
    font-size: 14px;
}
.job-insights-overlay .job-insights-subtitle {
    margin-bottom: 8px;
    color: #56687a;
}
.job-insights-overlay .job-insights-row {
    display: flex;
    justify-content: space-between;
    gap: 12px;
    padding: 2px 0;
}
.job-insights-overlay .job-insights-label {
    color: #56687a;
}
.job-insights-overlay .job-insights-value {
    font-weight: 600;
}
.job-insights-overlay .job-insights-footnote {
    margin-top: 8px;
    font-size: 12px;
    color: #56687a;
}
.job-insights-overlay .job-insights-close {
    position: absolute;
    top: 6px;
    right: 8px;
    border: none;
    background: transparent;
    font-size: 18px;
    line-height: 1;
    cursor: pointer;
    color: #56687a;
}
"#;
