use crate::converter::SupportedLanguage;

fn escape(text: &str) -> String {
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

/// Converter form page. Posts multipart to `/convert` and shows the JSON result.
pub fn render_index(languages: &[SupportedLanguage], allowed_extensions: &[String]) -> String {
    let options: String = languages
        .iter()
        .map(|l| {
            format!(
                "          <option value=\"{}\">{}</option>\n",
                escape(&l.key),
                escape(&l.label)
            )
        })
        .collect();
    let accept = allowed_extensions
        .iter()
        .map(|ext| format!(".{}", escape(ext)))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>ColdFusion Code Converter</title>
  </head>
  <body>
    <h1>ColdFusion Code Converter</h1>
    <form id="convert-form" action="/convert" method="post" enctype="multipart/form-data">
      <label>Target language
        <select name="target_language" required>
{options}        </select>
      </label>
      <label>ColdFusion code
        <textarea name="code_input" rows="16" cols="100"></textarea>
      </label>
      <label>Or upload a file
        <input type="file" name="file" accept="{accept}">
      </label>
      <label>Additional instructions
        <textarea name="custom_prompt" rows="4" cols="100"></textarea>
      </label>
      <button type="submit">Convert</button>
    </form>
    <pre id="result"></pre>
    <script>
      document.getElementById("convert-form").addEventListener("submit", async (event) => {{
        event.preventDefault();
        const out = document.getElementById("result");
        out.textContent = "Converting...";
        const response = await fetch("/convert", {{ method: "POST", body: new FormData(event.target) }});
        const body = await response.json();
        out.textContent = body.success ? body.converted_code : "Error: " + body.error;
      }});
    </script>
  </body>
</html>
"#
    )
}
