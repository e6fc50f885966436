use super::{Processed, SourceFile};
use crate::{
    config::BuildConfig,
    log,
    utils::{fs::write_file, minify::minify_js},
};
use anyhow::{Context, Result};
use std::{borrow::Cow, fs};

/// Process one script. A minify failure copies the original bytes.
pub fn process_script(file: &SourceFile, config: &BuildConfig) -> Result<Processed> {
    let source =
        fs::read(&file.path).with_context(|| format!("Failed to read script {}", file.rel))?;

    let (output, fallback) = if config.minify {
        match minify_js(&source) {
            Ok(minified) => (Cow::Owned(minified), false),
            Err(err) => {
                log!("warn"; "{}: {err}, copied original", file.rel);
                (Cow::Borrowed(source.as_slice()), true)
            }
        }
    } else {
        (Cow::Borrowed(source.as_slice()), false)
    };

    write_file(&file.dest(&config.output), &output)
        .with_context(|| format!("Failed to write script {}", file.rel))?;

    Ok(Processed::new(source.len(), output.len(), fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn setup(root: &Path, rel: &str, js: &str) -> (BuildConfig, SourceFile) {
        let mut config = BuildConfig::default();
        config.source = root.join("site");
        config.output = root.join("dist");
        let path = config.source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, js).unwrap();
        (config, SourceFile { path, rel: rel.into() })
    }

    #[test]
    fn test_script_minified() {
        let dir = tempfile::tempdir().unwrap();
        let js = "function greet(name) {\n  return 'hello ' + name;\n}\nconsole.log(greet('x'));\n";
        let (config, file) = setup(dir.path(), "js/app.js", js);

        let processed = process_script(&file, &config).unwrap();

        assert!(!processed.fallback);
        assert!(processed.output < processed.input);
        assert!(config.output.join("js/app.js").is_file());
    }

    #[test]
    fn test_syntax_error_copies_original() {
        let dir = tempfile::tempdir().unwrap();
        let js = "function broken( {\n  return;\n";
        let (config, file) = setup(dir.path(), "js/broken.js", js);

        let processed = process_script(&file, &config).unwrap();

        assert!(processed.fallback);
        assert_eq!(fs::read_to_string(config.output.join("js/broken.js")).unwrap(), js);
    }
}
