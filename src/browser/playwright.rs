use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use crate::config::BrowserSettings;
use crate::errors::AuditError;
use crate::models::JsError;
use super::{Browser, BrowserLauncher, PageHandle, PageOptions};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
/// Slack added on top of a command's own timeout so the Node side reports first.
const COMMAND_MARGIN: Duration = Duration::from_secs(10);

/// Launches a resident Node.js process that keeps a single Chromium instance
/// alive and accepts JSON-line commands on stdin. Every response is one JSON
/// line on stdout: `{"id":N,"ok":true,"result":...}` or
/// `{"id":N,"ok":false,"error":"...","errorName":"TimeoutError"}`.
#[derive(Debug, Default, Clone)]
pub struct PlaywrightLauncher;

impl PlaywrightLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, settings: &BrowserSettings) -> Result<Arc<dyn Browser>, AuditError> {
        let bridge = Bridge::spawn(settings).await?;
        Ok(Arc::new(PlaywrightBrowser { bridge: Arc::new(bridge) }))
    }
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

struct Bridge {
    io: Mutex<BridgeIo>,
    child: Mutex<Child>,
    next_id: AtomicU64,
    script_path: PathBuf,
}

impl Bridge {
    async fn spawn(settings: &BrowserSettings) -> Result<Self, AuditError> {
        let script_path = std::env::temp_dir().join(format!("siteaudit-pw-{}.js", uuid::Uuid::new_v4()));
        tokio::fs::write(&script_path, SERVER_SCRIPT).await?;

        let mut child = Command::new(&settings.node_binary)
            .arg(&script_path)
            .env("SITEAUDIT_HEADLESS", if settings.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AuditError::Browser(format!("Failed to start {}: {}", settings.node_binary, e)))?;

        let stdin = child.stdin.take()
            .ok_or_else(|| AuditError::Browser("Browser process has no stdin".into()))?;
        let stdout = child.stdout.take()
            .ok_or_else(|| AuditError::Browser("Browser process has no stdout".into()))?;
        let mut stdout = BufReader::new(stdout).lines();

        // Wait for the browser to be ready
        let ready = tokio::time::timeout(STARTUP_TIMEOUT, stdout.next_line())
            .await
            .map_err(|_| AuditError::Browser("Timed out waiting for browser startup".into()))?
            .map_err(|e| AuditError::Browser(format!("Browser startup read failed: {}", e)))?;
        match ready.as_deref().map(serde_json::from_str::<Value>) {
            Some(Ok(v)) if v["ready"] == true => {}
            Some(Ok(v)) => {
                let msg = v["error"].as_str().unwrap_or("unexpected startup message").to_string();
                return Err(AuditError::Browser(format!("Browser failed to launch: {}", msg)));
            }
            _ => return Err(AuditError::Browser("Browser process exited during startup".into())),
        }

        debug!(script = %script_path.display(), "Playwright browser server ready");
        Ok(Self {
            io: Mutex::new(BridgeIo { stdin, stdout }),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
            script_path,
        })
    }

    /// Send one command and wait for its response line.
    async fn call(&self, action: &str, args: Value, timeout: Duration) -> Result<Value, AuditError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut cmd = json!({ "id": id, "action": action });
        if let (Some(obj), Value::Object(extra)) = (cmd.as_object_mut(), args) {
            obj.extend(extra);
        }
        let mut line = serde_json::to_string(&cmd)?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await
            .map_err(|e| AuditError::Browser(format!("Browser command write failed: {}", e)))?;
        io.stdin.flush().await
            .map_err(|e| AuditError::Browser(format!("Browser command flush failed: {}", e)))?;

        let deadline = tokio::time::Instant::now() + timeout + COMMAND_MARGIN;
        loop {
            let next = tokio::time::timeout_at(deadline, io.stdout.next_line())
                .await
                .map_err(|_| AuditError::Timeout(format!("Browser command '{}' timed out", action)))?
                .map_err(|e| AuditError::Browser(format!("Browser read failed: {}", e)))?;
            let Some(raw) = next else {
                return Err(AuditError::Browser("Browser process exited".into()));
            };
            let response: Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(_) => {
                    debug!(line = %raw, "Ignoring non-protocol browser output");
                    continue;
                }
            };
            // Late responses to commands that already timed out are skipped
            if response["id"].as_u64() != Some(id) {
                continue;
            }
            if response["ok"] == true {
                return Ok(response.get("result").cloned().unwrap_or(Value::Null));
            }
            let message = response["error"].as_str().unwrap_or("unknown browser error").to_string();
            return Err(match response["errorName"].as_str() {
                Some("TimeoutError") => AuditError::Timeout(message),
                _ if matches!(action, "goto" | "reload") => AuditError::Navigation(message),
                _ => AuditError::Browser(message),
            });
        }
    }

    async fn shutdown(&self) {
        let _ = self.call("quit", json!({}), Duration::from_secs(5)).await;
        let mut child = self.child.lock().await;
        if tokio::time::timeout(Duration::from_secs(5), child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
        let _ = tokio::fs::remove_file(&self.script_path).await;
    }
}

pub struct PlaywrightBrowser {
    bridge: Arc<Bridge>,
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    async fn new_page(&self, options: &PageOptions) -> Result<Box<dyn PageHandle>, AuditError> {
        let result = self.bridge.call(
            "newPage",
            json!({
                "viewport": { "width": options.viewport.width, "height": options.viewport.height },
                "userAgent": options.user_agent,
            }),
            DEFAULT_COMMAND_TIMEOUT,
        ).await?;
        let page_id = result.as_str()
            .ok_or_else(|| AuditError::Browser("newPage returned no page id".into()))?
            .to_string();
        Ok(Box::new(PlaywrightPage {
            bridge: self.bridge.clone(),
            page_id,
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), AuditError> {
        self.bridge.shutdown().await;
        Ok(())
    }
}

pub struct PlaywrightPage {
    bridge: Arc<Bridge>,
    page_id: String,
    closed: AtomicBool,
}

fn status_from(value: Value) -> Option<u16> {
    value.as_u64().and_then(|s| u16::try_from(s).ok())
}

#[async_trait]
impl PageHandle for PlaywrightPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<u16>, AuditError> {
        let result = self.bridge.call(
            "goto",
            json!({ "pageId": self.page_id, "url": url, "timeout": timeout.as_millis() as u64 }),
            timeout,
        ).await?;
        Ok(status_from(result))
    }

    async fn reload(&self, timeout: Duration) -> Result<Option<u16>, AuditError> {
        let result = self.bridge.call(
            "reload",
            json!({ "pageId": self.page_id, "timeout": timeout.as_millis() as u64 }),
            timeout,
        ).await?;
        Ok(status_from(result))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AuditError> {
        self.bridge.call(
            "evaluate",
            json!({ "pageId": self.page_id, "script": script }),
            DEFAULT_COMMAND_TIMEOUT,
        ).await
    }

    async fn submit_form(&self, form_selector: &str, timeout: Duration) -> Result<Option<u16>, AuditError> {
        let result = self.bridge.call(
            "submitForm",
            json!({ "pageId": self.page_id, "selector": form_selector, "timeout": timeout.as_millis() as u64 }),
            timeout,
        ).await?;
        Ok(status_from(result))
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<(), AuditError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.bridge.call(
            "screenshot",
            json!({ "pageId": self.page_id, "path": path.to_string_lossy(), "fullPage": full_page }),
            DEFAULT_COMMAND_TIMEOUT,
        ).await?;
        Ok(())
    }

    async fn capture_errors(&self, window: Duration) -> Result<Vec<JsError>, AuditError> {
        let result = self.bridge.call(
            "captureErrors",
            json!({ "pageId": self.page_id, "windowMs": window.as_millis() as u64 }),
            window,
        ).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn close(&self) -> Result<(), AuditError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bridge.call("closePage", json!({ "pageId": self.page_id }), DEFAULT_COMMAND_TIMEOUT).await?;
        Ok(())
    }
}

impl Drop for PlaywrightPage {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // Best-effort cleanup, can't do async in drop
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let bridge = self.bridge.clone();
        let page_id = self.page_id.clone();
        handle.spawn(async move {
            if let Err(e) = bridge.call("closePage", json!({ "pageId": page_id }), Duration::from_secs(5)).await {
                warn!(page_id = %page_id, error = %e, "Failed to close dropped page");
            }
        });
    }
}

/// Resident Playwright server. Reads one JSON command per line from stdin.
const SERVER_SCRIPT: &str = r#"const readline = require('readline');
const { chromium } = require('playwright');

const pages = new Map();
let nextPage = 1;

function send(msg) { process.stdout.write(JSON.stringify(msg) + '\n'); }

function getPage(id) {
  const entry = pages.get(id);
  if (!entry) throw new Error('Unknown page: ' + id);
  return entry.page;
}

async function captureErrors(page, windowMs) {
  const errors = [];
  const now = () => new Date().toISOString();
  const onConsole = msg => {
    if (msg.type() !== 'error') return;
    const loc = msg.location() || {};
    errors.push({ message: msg.text(), source: loc.url || null, line: loc.lineNumber ?? null,
      column: loc.columnNumber ?? null, stack: null, timestamp: now() });
  };
  const onPageError = err => {
    errors.push({ message: err.message, source: null, line: null, column: null,
      stack: err.stack || null, timestamp: now() });
  };
  page.on('console', onConsole);
  page.on('pageerror', onPageError);
  try {
    await page.evaluate(() => {
      window.__siteauditErrors = [];
      window.__siteauditOnError = e => window.__siteauditErrors.push({
        message: e.message, source: e.filename || null, line: e.lineno || null, column: e.colno || null,
        stack: (e.error && e.error.stack) || null, timestamp: new Date().toISOString() });
      window.__siteauditOnRejection = e => window.__siteauditErrors.push({
        message: 'Unhandled Promise Rejection: ' + ((e.reason && e.reason.message) || String(e.reason)),
        source: null, line: null, column: null, stack: (e.reason && e.reason.stack) || null,
        timestamp: new Date().toISOString() });
      window.addEventListener('error', window.__siteauditOnError);
      window.addEventListener('unhandledrejection', window.__siteauditOnRejection);
    }).catch(() => {});
    await page.waitForTimeout(windowMs);
    const inPage = await page.evaluate(() => {
      window.removeEventListener('error', window.__siteauditOnError);
      window.removeEventListener('unhandledrejection', window.__siteauditOnRejection);
      const collected = window.__siteauditErrors || [];
      delete window.__siteauditErrors;
      return collected;
    }).catch(() => []);
    errors.push(...inPage);
  } finally {
    page.off('console', onConsole);
    page.off('pageerror', onPageError);
  }
  return errors;
}

(async () => {
  let browser;
  try {
    browser = await chromium.launch({ headless: process.env.SITEAUDIT_HEADLESS !== '0',
      args: ['--no-sandbox', '--disable-dev-shm-usage'] });
  } catch (e) {
    send({ ready: false, error: e.message });
    process.exit(1);
  }
  send({ ready: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let cmd;
    try { cmd = JSON.parse(line); } catch (e) { continue; }
    try {
      let result = null;
      switch (cmd.action) {
        case 'newPage': {
          const opts = { viewport: cmd.viewport, ignoreHTTPSErrors: true };
          if (cmd.userAgent) opts.userAgent = cmd.userAgent;
          const context = await browser.newContext(opts);
          const page = await context.newPage();
          const id = 'p' + (nextPage++);
          pages.set(id, { context, page });
          result = id;
          break;
        }
        case 'goto': {
          const resp = await getPage(cmd.pageId).goto(cmd.url, { waitUntil: 'networkidle', timeout: cmd.timeout });
          result = resp ? resp.status() : null;
          break;
        }
        case 'reload': {
          const resp = await getPage(cmd.pageId).reload({ waitUntil: 'networkidle', timeout: cmd.timeout });
          result = resp ? resp.status() : null;
          break;
        }
        case 'evaluate':
          result = await getPage(cmd.pageId).evaluate(cmd.script);
          break;
        case 'submitForm': {
          const page = getPage(cmd.pageId);
          const waiter = page.waitForResponse(
            r => ['POST', 'PUT'].includes(r.request().method()), { timeout: cmd.timeout }).catch(() => null);
          const form = await page.$(cmd.selector);
          if (!form) throw new Error('Form not found: ' + cmd.selector);
          const submit = await form.$('button[type="submit"], input[type="submit"], button:not([type])');
          if (submit) await submit.click();
          else await form.evaluate(f => f.submit());
          const resp = await waiter;
          result = resp ? resp.status() : null;
          break;
        }
        case 'screenshot':
          await getPage(cmd.pageId).screenshot({ path: cmd.path, fullPage: cmd.fullPage });
          break;
        case 'captureErrors':
          result = await captureErrors(getPage(cmd.pageId), cmd.windowMs);
          break;
        case 'closePage': {
          const entry = pages.get(cmd.pageId);
          if (entry) {
            pages.delete(cmd.pageId);
            await entry.context.close();
          }
          break;
        }
        case 'quit':
          send({ id: cmd.id, ok: true, result: null });
          await browser.close();
          process.exit(0);
        default:
          throw new Error('Unknown action: ' + cmd.action);
      }
      send({ id: cmd.id, ok: true, result: result === undefined ? null : result });
    } catch (e) {
      send({ id: cmd.id, ok: false, error: e.message, errorName: e.name });
    }
  }
  await browser.close();
})();
"#;
