use crate::error::Error;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// What each renderer opens as its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleDocument {
    Path(PathBuf),
    /// Transformed document text, e.g. a VRT XML string.
    Inline(String),
}

impl StyleDocument {
    pub fn as_path(&self) -> &Path {
        match self {
            StyleDocument::Path(path) => path,
            StyleDocument::Inline(text) => Path::new(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Style {
    path: PathBuf,
    params: Vec<(String, String)>,
}

impl Style {
    /// `params` are `name:value` pairs substituted for `${name}` in the document.
    pub fn new(path: &Path, params: &[String]) -> Result<Self, Error> {
        let params = params
            .iter()
            .map(|param| {
                param
                    .split_once(':')
                    .filter(|(name, _)| !name.is_empty())
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .ok_or_else(|| {
                        Error::Config(format!("style param must be <name>:<value>: {param}"))
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            params,
        })
    }

    /// Produces the final document; without params the file is used as is.
    pub fn preprocess(&self) -> Result<StyleDocument, Error> {
        if self.params.is_empty() {
            return Ok(StyleDocument::Path(self.path.clone()));
        }

        log::info!(
            "Transforming style {} with {} parameter(s)",
            self.path.display(),
            self.params.len()
        );

        let text = fs::read_to_string(&self.path).map_err(|source| Error::Style {
            path: self.path.clone(),
            source,
        })?;

        Ok(StyleDocument::Inline(self.apply_params(text)))
    }

    fn apply_params(&self, text: String) -> String {
        self.params.iter().fold(text, |text, (name, value)| {
            text.replace(&format!("${{{name}}}"), value)
        })
    }
}
