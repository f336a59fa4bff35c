use std::io;
use std::path::Path;

/// Canonical entry path of the chat client, target of the `GET /` redirect.
pub const INDEX_ROUTE: &str = "/ollama8web/index.html";

const INDEX_FILE: &str = "ollama8web/index.html";

/// Minimal chat client seeded on first boot so the server is usable with
/// zero external assets. Talks to the relay's own /api endpoints.
const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Ollama8Web</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
  #log { border: 1px solid #ccc; border-radius: 8px; min-height: 20rem; padding: 1rem; white-space: pre-wrap; }
  form { display: flex; gap: 0.5rem; margin-top: 1rem; }
  input { flex: 1; padding: 0.5rem; }
</style>
</head>
<body>
<h1>Ollama8Web</h1>
<div id="log"></div>
<form id="chat">
  <input id="prompt" placeholder="Ask the model..." autocomplete="off">
  <button type="submit">Send</button>
</form>
<script>
const log = document.getElementById('log');
const form = document.getElementById('chat');
const input = document.getElementById('prompt');

form.addEventListener('submit', async (event) => {
  event.preventDefault();
  const prompt = input.value.trim();
  if (!prompt) return;
  input.value = '';
  log.textContent += '> ' + prompt + '\n';
  try {
    const res = await fetch('/api/generate', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ model: 'llama2', prompt, stream: false }),
    });
    const data = await res.json();
    log.textContent += (data.response || data.error || '(no response)') + '\n';
  } catch (err) {
    log.textContent += 'Error: ' + err + '\n';
  }
});
</script>
</body>
</html>
"#;

/// Seed the default chat client if the web root has no entry document.
pub fn ensure_index(web_root: &Path) -> io::Result<()> {
    let index = web_root.join(INDEX_FILE);
    if index.exists() {
        return Ok(());
    }

    if let Some(parent) = index.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&index, DEFAULT_INDEX)?;

    tracing::info!("Created default chat client at {}", index.display());
    Ok(())
}
