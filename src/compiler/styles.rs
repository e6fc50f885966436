use super::{Processed, SourceFile};
use crate::{
    config::BuildConfig,
    log,
    utils::{fs::write_file, minify::minify_css, purge::Purger},
};
use anyhow::{Context, Result};
use std::{borrow::Cow, fs};

/// Process one stylesheet: purge unused rules, then minify.
///
/// A purge failure (or a purge that removes everything) keeps the original
/// stylesheet; a minify failure keeps the purged one. Neither fails the
/// build.
pub fn process_style(
    file: &SourceFile,
    config: &BuildConfig,
    purger: Option<&Purger>,
) -> Result<Processed> {
    let css = fs::read_to_string(&file.path)
        .with_context(|| format!("Failed to read stylesheet {}", file.rel))?;
    let mut fallback = false;

    let purged: Cow<'_, str> = match purger.map(|p| p.purge(&css)) {
        Some(Ok(out)) if out.trim().is_empty() && !css.trim().is_empty() => {
            log!("warn"; "{}: purge removed every rule, kept original", file.rel);
            fallback = true;
            Cow::Borrowed(&css)
        }
        Some(Ok(out)) => Cow::Owned(out),
        Some(Err(err)) => {
            log!("warn"; "{}: {err}, kept original", file.rel);
            fallback = true;
            Cow::Borrowed(&css)
        }
        None => Cow::Borrowed(&css),
    };

    let output: Cow<'_, str> = if config.minify {
        match minify_css(&purged) {
            Ok(minified) => Cow::Owned(minified),
            Err(err) => {
                log!("warn"; "{}: {err}, kept unminified", file.rel);
                fallback = true;
                purged
            }
        }
    } else {
        purged
    };

    write_file(&file.dest(&config.output), output.as_bytes())
        .with_context(|| format!("Failed to write stylesheet {}", file.rel))?;

    Ok(Processed::new(css.len(), output.len(), fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn setup(root: &Path, rel: &str, css: &str) -> (BuildConfig, SourceFile) {
        let mut config = BuildConfig::default();
        config.source = root.join("site");
        config.output = root.join("dist");
        let path = config.source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, css).unwrap();
        (config, SourceFile { path, rel: rel.into() })
    }

    fn purger(markup: &str) -> Purger {
        let mut purger = Purger::new::<&str>(&[]);
        purger.scan(markup);
        purger
    }

    #[test]
    fn test_purge_then_minify() {
        let dir = tempfile::tempdir().unwrap();
        let (config, file) = setup(dir.path(), "css/main.css", ".card { color: red; }\n.unused { color: blue; }\n");
        let purger = purger(r#"<div class="card"></div>"#);

        let processed = process_style(&file, &config, Some(&purger)).unwrap();
        let written = fs::read_to_string(config.output.join("css/main.css")).unwrap();

        assert!(written.contains(".card{"));
        assert!(!written.contains("unused"));
        assert!(!processed.fallback);
        assert!(processed.output < processed.input);
    }

    #[test]
    fn test_unbalanced_purge_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let css = ".card { color: red; }\n.unused { color: blue;\n";
        let (mut config, file) = setup(dir.path(), "broken.css", css);
        config.minify = false;

        let processed = process_style(&file, &config, Some(&purger("card"))).unwrap();
        let written = fs::read_to_string(config.output.join("broken.css")).unwrap();

        assert_eq!(written, css);
        assert!(processed.fallback);
    }

    #[test]
    fn test_purge_removing_everything_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let css = ".ghost { color: red; }\n";
        let (mut config, file) = setup(dir.path(), "ghost.css", css);
        config.minify = false;

        let processed = process_style(&file, &config, Some(&purger("nothing here"))).unwrap();

        assert_eq!(fs::read_to_string(config.output.join("ghost.css")).unwrap(), css);
        assert!(processed.fallback);
    }

    #[test]
    fn test_no_purge_no_minify_is_copy() {
        let dir = tempfile::tempdir().unwrap();
        let css = ".a { color: red; }\n";
        let (mut config, file) = setup(dir.path(), "a.css", css);
        config.minify = false;

        let processed = process_style(&file, &config, None).unwrap();

        assert_eq!(fs::read_to_string(config.output.join("a.css")).unwrap(), css);
        assert_eq!(processed.input, processed.output);
    }
}
