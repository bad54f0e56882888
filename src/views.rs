//! HTML views - upload form, result page, error page

use axum::http::StatusCode;
use serde::Serialize;

use crate::inference::Label;

/// How the client wants the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Html,
}

/// Data shown on the result page
#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub prediction: Label,
    pub probability: f32,
    pub probability_percent: f64,
    pub image_url: String,
}

impl ResultView {
    pub fn new(prediction: Label, probability: f32, image_url: String) -> Self {
        Self {
            prediction,
            probability,
            probability_percent: probability_percent(probability),
            image_url,
        }
    }
}

/// `probability * 100`, rounded to 2 decimals
pub fn probability_percent(probability: f32) -> f64 {
    (f64::from(probability) * 100.0 * 100.0).round() / 100.0
}

const STYLE: &str = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #f4f6f9;
            color: #222;
            line-height: 1.6;
        }
        .container { max-width: 640px; margin: 40px auto; padding: 24px; background: #fff; border-radius: 8px; }
        h1 { font-size: 24px; margin-bottom: 16px; }
        .drop-zone { border: 2px dashed #9aa5b1; border-radius: 8px; padding: 32px; text-align: center; margin-bottom: 16px; cursor: pointer; }
        .drop-zone.active { border-color: #2563eb; background: #eff6ff; }
        .hidden { display: none; }
        .link-button { background: none; color: #2563eb; padding: 0; margin-bottom: 16px; }
        button, .button { background: #2563eb; color: #fff; border: none; padding: 10px 20px; border-radius: 6px; cursor: pointer; text-decoration: none; }
        .label-NORMAL { color: #15803d; }
        .label-PNEUMONIA { color: #b91c1c; }
        .bar { height: 12px; background: #e5e7eb; border-radius: 6px; overflow: hidden; margin: 8px 0 16px; }
        .bar > div { height: 100%; background: #2563eb; }
        img.preview { max-width: 100%; border-radius: 6px; margin-bottom: 16px; }
        .error { color: #b91c1c; }
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
{body}
    </div>
</body>
</html>
"#,
        title = escape(title),
        style = STYLE,
        body = body,
    )
}

/// GET / and non-POST /predict/
pub fn home_page() -> String {
    layout(
        "Chest X-ray Pneumonia Detection",
        r#"        <h1>Chest X-ray Pneumonia Detection</h1>
        <form id="uploadForm" action="/predict/" method="post" enctype="multipart/form-data">
            <div id="dropZone" class="drop-zone">
                <p>Drop a chest X-ray here or click to choose a file</p>
            </div>
            <input id="fileInput" class="hidden" type="file" name="image" accept="image/*">
            <div id="previewBox" class="hidden">
                <img id="previewImg" class="preview" src="" alt="Selected X-ray">
                <button id="clearBtn" class="link-button" type="button">Clear</button>
            </div>
            <button id="submitBtn" type="submit">Detect</button>
        </form>
        <script>
            document.addEventListener('DOMContentLoaded', function () {
                var dropZone = document.getElementById('dropZone');
                var fileInput = document.getElementById('fileInput');
                var previewBox = document.getElementById('previewBox');
                var previewImg = document.getElementById('previewImg');
                var clearBtn = document.getElementById('clearBtn');
                var uploadForm = document.getElementById('uploadForm');
                var submitBtn = document.getElementById('submitBtn');

                function showPreview(file) {
                    var reader = new FileReader();
                    reader.onload = function (e) {
                        previewImg.src = e.target.result;
                        previewBox.classList.remove('hidden');
                    };
                    reader.readAsDataURL(file);
                }

                dropZone.addEventListener('click', function () { fileInput.click(); });

                ['dragenter', 'dragover'].forEach(function (evt) {
                    dropZone.addEventListener(evt, function (e) {
                        e.preventDefault();
                        e.stopPropagation();
                        dropZone.classList.add('active');
                    });
                });
                ['dragleave', 'drop'].forEach(function (evt) {
                    dropZone.addEventListener(evt, function (e) {
                        e.preventDefault();
                        e.stopPropagation();
                        dropZone.classList.remove('active');
                    });
                });
                dropZone.addEventListener('drop', function (e) {
                    if (!e.dataTransfer.files.length) return;
                    fileInput.files = e.dataTransfer.files;
                    showPreview(fileInput.files[0]);
                });

                fileInput.addEventListener('change', function () {
                    if (!fileInput.files.length) return;
                    showPreview(fileInput.files[0]);
                });

                clearBtn.addEventListener('click', function (e) {
                    e.preventDefault();
                    fileInput.value = '';
                    previewImg.src = '';
                    previewBox.classList.add('hidden');
                });

                uploadForm.addEventListener('submit', function (e) {
                    if (!fileInput.files.length) {
                        e.preventDefault();
                        alert('Please choose an image first.');
                        return;
                    }
                    submitBtn.disabled = true;
                    submitBtn.innerText = 'Detecting...';
                });
            });
        </script>"#,
    )
}

pub fn result_page(view: &ResultView) -> String {
    let label = view.prediction.as_str();
    let body = format!(
        r#"        <h1>Result</h1>
        <img class="preview" src="{url}" alt="Uploaded X-ray">
        <p>Prediction: <strong class="label-{label}">{label}</strong></p>
        <p>Probability of pneumonia: {percent:.2}%</p>
        <div class="bar"><div style="width: {percent:.2}%"></div></div>
        <a class="button" href="/">Analyze another image</a>"#,
        url = escape(&view.image_url),
        label = label,
        percent = view.probability_percent,
    );
    layout("Prediction Result", &body)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        r#"        <h1>{code} {reason}</h1>
        <p class="error">{message}</p>
        <a class="button" href="/">Back</a>"#,
        code = status.as_u16(),
        reason = status.canonical_reason().unwrap_or("Error"),
        message = escape(message),
    );
    layout("Error", &body)
}

/// Minimal HTML escaping for text and attribute values
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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
