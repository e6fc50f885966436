use super::{Processed, SourceFile, embed};
use crate::{
    config::BuildConfig,
    utils::{fs::write_file, minify::minify_html},
};
use anyhow::{Context, Result};
use std::{borrow::Cow, fs};

/// Process one markup file: embed data blocks into the target page, then
/// minify. Markup that is not valid UTF-8 fails the build.
pub fn process_markup(file: &SourceFile, config: &BuildConfig) -> Result<Processed> {
    let html = fs::read_to_string(&file.path)
        .with_context(|| format!("Failed to read markup {}", file.rel))?;

    let html = if embed::is_target(file, config) {
        embed::inject(&html, &embed::DataBlocks::load(config))
    } else {
        Cow::Borrowed(html.as_str())
    };

    let bytes = if config.minify {
        Cow::Owned(minify_html(html.as_bytes()))
    } else {
        Cow::Borrowed(html.as_bytes())
    };

    write_file(&file.dest(&config.output), &bytes)
        .with_context(|| format!("Failed to write markup {}", file.rel))?;

    let input = fs::metadata(&file.path).map_or(0, |m| m.len());
    Ok(Processed {
        input,
        output: bytes.len() as u64,
        fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn setup(root: &Path, minify: bool) -> BuildConfig {
        let mut config = BuildConfig::default();
        config.source = root.join("site");
        config.output = root.join("dist");
        config.minify = minify;
        fs::create_dir_all(config.source.join("data")).unwrap();
        config
    }

    fn file(config: &BuildConfig, rel: &str, content: &str) -> SourceFile {
        let path = config.source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        SourceFile { path, rel: rel.into() }
    }

    #[test]
    fn test_markup_minified() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), true);
        let page = file(&config, "about/index.html", "<html>\n  <body>\n    <p>About</p>\n  </body>\n</html>\n");

        let processed = process_markup(&page, &config).unwrap();
        let written = fs::read_to_string(config.output.join("about/index.html")).unwrap();

        assert!(written.contains("<p>About</p>"));
        assert!(!written.contains("\n  "));
        assert!(processed.output < processed.input);
    }

    #[test]
    fn test_target_page_gets_data_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), false);
        fs::write(config.source.join("data/results.csv"), "name,score\nAlpha,42\n").unwrap();
        let page = file(&config, "index.html", "<html><head></head><body></body></html>");
        let other = file(&config, "other.html", "<html><head></head><body></body></html>");

        process_markup(&page, &config).unwrap();
        process_markup(&other, &config).unwrap();

        let index = fs::read_to_string(config.output.join("index.html")).unwrap();
        assert!(index.contains(r#"id="embedded-csv-rows">[{"name":"Alpha","score":42}]"#));
        assert!(!index.contains("embedded-json"));

        let other = fs::read_to_string(config.output.join("other.html")).unwrap();
        assert!(!other.contains("embedded"));
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), true);
        let path = config.source.join("bad.html");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let bad = SourceFile { path, rel: "bad.html".into() };
        assert!(process_markup(&bad, &config).is_err());
    }
}
