//! The location sharing page.
//!
//! One template backs both the served page and the downloadable copy; the
//! download only differs in its `Content-Disposition` header and, when the
//! header image is small enough, in carrying that image inline. Rendering is
//! a pure function of [`ArtifactRequest`], so equal inputs give equal bytes.
//!
//! The page asks before it does anything. No geolocation call is made until
//! the visitor presses "Share my location"; from then on it reports once
//! immediately, on every position change, and on a fixed 5 second poll, until
//! the visitor stops it, the page goes away, or the link is turned off.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::link::LinkId;

/// Content type of both page variants.
pub const CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// How the header image reaches the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Referenced by absolute URL.
    Url(String),
    /// Embedded as a `data:` URL.
    Inline {
        /// MIME type of the image.
        mime: String,
        /// Base64 payload.
        base64: String,
    },
}

impl ImageSource {
    /// Inline `bytes` if their base64 form is non-empty and shorter than
    /// `limit`, otherwise fall back to `url`.
    #[must_use]
    pub fn inline_or_url(bytes: Option<&[u8]>, mime: &str, limit: usize, url: String) -> Self {
        match bytes.map(|b| STANDARD.encode(b)) {
            Some(base64) if !base64.is_empty() && base64.len() < limit => Self::Inline {
                mime: mime.to_string(),
                base64,
            },
            _ => Self::Url(url),
        }
    }

    /// Whether an asset of `len` bytes would inline under `limit`.
    ///
    /// Lets callers skip reading assets that could never be inlined.
    #[must_use]
    pub fn fits_inline(len: u64, limit: usize) -> bool {
        usize::try_from(len)
            .ok()
            .and_then(|len| base64::encoded_len(len, true))
            .is_some_and(|encoded| encoded > 0 && encoded < limit)
    }

    fn src(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Inline { mime, base64 } => format!("data:{mime};base64,{base64}"),
        }
    }
}

/// Everything a page depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Link the page reports for.
    pub link_id: LinkId,
    /// Origin the page posts reports to (no trailing slash).
    pub api_base: String,
    /// Header image.
    pub image: ImageSource,
    /// Serve as a file download.
    pub attachment: bool,
}

/// A rendered page plus the headers it must be served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// The HTML document.
    pub body: String,
    /// Value for `Content-Type`.
    pub content_type: &'static str,
    /// Value for `Content-Disposition`, set for downloads only.
    pub content_disposition: Option<String>,
}

impl ArtifactRequest {
    /// File name offered for downloads.
    #[must_use]
    pub fn filename(&self) -> String {
        format!("location-share-{}.html", self.link_id.short())
    }
}

/// Escape text for HTML element content and quoted attributes.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render `raw` as a JavaScript string literal that is safe inside `<script>`.
#[must_use]
pub fn js_string(raw: &str) -> String {
    serde_json::to_string(raw)
        .unwrap_or_else(|_| String::from("\"\""))
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

/// Render the page.
#[must_use]
pub fn render(request: &ArtifactRequest) -> Artifact {
    let link_id = request.link_id.to_string();
    let mut body = String::with_capacity(PAGE_HEAD.len() + PAGE_MAIN.len() + PAGE_SCRIPT.len() + 512);

    body.push_str(PAGE_HEAD);
    body.push_str("  <img class=\"banner\" alt=\"\" src=\"");
    body.push_str(&escape_html(&request.image.src()));
    body.push_str("\">\n");
    body.push_str(PAGE_MAIN);
    body.push_str("    <p class=\"ref\">Link reference: ");
    body.push_str(&escape_html(&request.link_id.short()));
    body.push_str("</p>\n  </main>\n  <script>\n  (function () {\n    \"use strict\";\n    var LINK_ID = ");
    body.push_str(&js_string(&link_id));
    body.push_str(";\n    var API_BASE = ");
    body.push_str(&js_string(&request.api_base));
    body.push_str(";\n");
    body.push_str(PAGE_SCRIPT);

    Artifact {
        body,
        content_type: CONTENT_TYPE,
        content_disposition: request
            .attachment
            .then(|| format!("attachment; filename=\"{}\"", request.filename())),
    }
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Location sharing request</title>
  <style>
    * { box-sizing: border-box; }
    body {
      margin: 0;
      min-height: 100vh;
      font-family: system-ui, -apple-system, "Segoe UI", Roboto, sans-serif;
      background: #f4f6f8;
      color: #1f2933;
      display: flex;
      flex-direction: column;
      align-items: center;
    }
    .banner {
      display: block;
      width: 100%;
      max-height: 240px;
      object-fit: cover;
    }
    main {
      max-width: 520px;
      margin: 24px 16px;
      padding: 24px;
      background: #ffffff;
      border-radius: 12px;
      box-shadow: 0 2px 8px rgba(0, 0, 0, 0.08);
    }
    h1 { font-size: 24px; margin: 0 0 12px; }
    p { line-height: 1.5; margin: 0 0 12px; }
    .actions { display: flex; gap: 12px; margin: 20px 0 12px; }
    button {
      flex: 1;
      padding: 12px;
      font-size: 16px;
      border: 0;
      border-radius: 8px;
      cursor: pointer;
    }
    button:disabled { opacity: 0.5; cursor: default; }
    #share { background: #2563eb; color: #ffffff; }
    #stop { background: #e5e7eb; color: #1f2933; }
    .status { font-weight: 600; }
    .ref { font-size: 13px; color: #6b7280; }
  </style>
</head>
<body>
"#;

const PAGE_MAIN: &str = r#"  <main>
    <h1>Location sharing request</h1>
    <p>The person who sent you this link is asking to see your current location.</p>
    <p>Nothing is shared unless you press <strong>Share my location</strong>, and your browser will ask for permission first. While sharing is on, your position is sent when it changes and every 5 seconds. Press <strong>Stop sharing</strong> or close this page to stop.</p>
    <noscript><p>JavaScript is turned off, so nothing can be shared from this page.</p></noscript>
    <div class="actions">
      <button id="share" type="button">Share my location</button>
      <button id="stop" type="button" disabled>Stop sharing</button>
    </div>
    <p class="status" id="status" role="status" aria-live="polite">Not sharing.</p>
"#;

const PAGE_SCRIPT: &str = r#"    var REPORT_URL = API_BASE + "/api/location/update";
    var POLL_MS = 5000;
    var DEVICE_KEY = "locshareDeviceId";

    var shareButton = document.getElementById("share");
    var stopButton = document.getElementById("stop");
    var statusLine = document.getElementById("status");
    var watchId = null;
    var pollTimer = null;
    var failures = 0;

    function deviceId() {
      var id = null;
      try { id = window.localStorage.getItem(DEVICE_KEY); } catch (e) {}
      if (!id) {
        id = "device_" + Math.random().toString(36).slice(2, 11) + "_" + Date.now();
        try { window.localStorage.setItem(DEVICE_KEY, id); } catch (e) {}
      }
      return id;
    }

    function setStatus(text) {
      statusLine.textContent = text;
    }

    function sharing() {
      return watchId !== null || pollTimer !== null;
    }

    function stop(message) {
      if (watchId !== null) {
        navigator.geolocation.clearWatch(watchId);
        watchId = null;
      }
      if (pollTimer !== null) {
        window.clearInterval(pollTimer);
        pollTimer = null;
      }
      shareButton.disabled = false;
      stopButton.disabled = true;
      setStatus(message);
    }

    function failed(reason) {
      failures += 1;
      setStatus(reason + " (" + failures + " failed so far). Trying again in 5 seconds.");
    }

    function report(position) {
      if (!sharing()) {
        return;
      }
      fetch(REPORT_URL, {
        method: "POST",
        headers: { "Content-Type": "application/json" },
        body: JSON.stringify({
          linkId: LINK_ID,
          latitude: position.coords.latitude,
          longitude: position.coords.longitude,
          deviceId: deviceId()
        })
      }).then(function (response) {
        if (response.status === 403 || response.status === 404) {
          stop("This link has been turned off. Nothing more is being shared.");
        } else if (!response.ok) {
          failed("The server refused the last update");
        } else {
          failures = 0;
          setStatus("Sharing your location. Last update at " + new Date().toLocaleTimeString() + ".");
        }
      }).catch(function () {
        failed("Could not reach the server");
      });
    }

    function positionError(error) {
      if (error && error.code === 1) {
        stop("Location permission was denied. Nothing is being shared.");
      }
    }

    function start() {
      if (!("geolocation" in navigator)) {
        setStatus("This browser cannot share its location.");
        return;
      }
      if (sharing()) {
        return;
      }
      failures = 0;
      shareButton.disabled = true;
      stopButton.disabled = false;
      setStatus("Waiting for your browser to provide a location...");
      watchId = navigator.geolocation.watchPosition(report, positionError, {
        enableHighAccuracy: true,
        maximumAge: 0
      });
      pollTimer = window.setInterval(function () {
        navigator.geolocation.getCurrentPosition(report, positionError);
      }, POLL_MS);
      navigator.geolocation.getCurrentPosition(report, positionError);
    }

    shareButton.addEventListener("click", start);
    stopButton.addEventListener("click", function () {
      stop("Sharing stopped. Nothing more will be sent.");
    });
    window.addEventListener("pagehide", function () {
      stop("Sharing stopped.");
    });
  })();
  </script>
</body>
</html>
"#;
