//! Command line argument wrappers
//!
//! Each wrapper knows how to render itself into command line tokens.
//! Arguments without a value render nothing.

use std::fmt::Display;

/// An argument that renders into command line tokens
pub trait CommandArgument {
    /// Position for positional arguments, `None` for keyword ones
    fn position(&self) -> Option<usize> {
        None
    }

    fn render(&self) -> Vec<String>;
}

/// `--name value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordArgument {
    keyword: &'static str,
    value: Option<String>,
}

impl KeywordArgument {
    pub fn new<T: Display>(keyword: &'static str, value: Option<T>) -> Self {
        Self {
            keyword,
            value: value.map(|value| value.to_string()),
        }
    }
}

impl CommandArgument for KeywordArgument {
    fn render(&self) -> Vec<String> {
        match &self.value {
            Some(value) => vec![self.keyword.to_string(), value.clone()],
            None => Vec::new(),
        }
    }
}

/// `--flag`, emitted only when set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanArgument {
    keyword: &'static str,
    value: bool,
}

impl BooleanArgument {
    pub fn new(keyword: &'static str, value: bool) -> Self {
        Self { keyword, value }
    }
}

impl CommandArgument for BooleanArgument {
    fn render(&self) -> Vec<String> {
        if self.value {
            vec![self.keyword.to_string()]
        } else {
            Vec::new()
        }
    }
}

/// `--name a,b,c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKeywordArgument {
    keyword: &'static str,
    values: Vec<String>,
    separator: char,
}

impl CompositeKeywordArgument {
    pub fn new<T: Display>(keyword: &'static str, values: &[T]) -> Self {
        Self {
            keyword,
            values: values.iter().map(ToString::to_string).collect(),
            separator: ',',
        }
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }
}

impl CommandArgument for CompositeKeywordArgument {
    fn render(&self) -> Vec<String> {
        if self.values.is_empty() {
            return Vec::new();
        }
        let joined = self.values.join(&self.separator.to_string());
        vec![self.keyword.to_string(), joined]
    }
}

/// A bare value at a fixed position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalArgument {
    index: usize,
    value: Option<String>,
}

impl PositionalArgument {
    pub fn new<T: Display>(index: usize, value: Option<T>) -> Self {
        Self {
            index,
            value: value.map(|value| value.to_string()),
        }
    }
}

impl CommandArgument for PositionalArgument {
    fn position(&self) -> Option<usize> {
        Some(self.index)
    }

    fn render(&self) -> Vec<String> {
        self.value.iter().cloned().collect()
    }
}

/// Render positional arguments by index, then keyword arguments in order
pub fn render_arguments(arguments: &[Box<dyn CommandArgument>]) -> Vec<String> {
    let mut positional: Vec<&dyn CommandArgument> = arguments
        .iter()
        .map(|argument| argument.as_ref())
        .filter(|argument| argument.position().is_some())
        .collect();
    positional.sort_by_key(|argument| argument.position());

    positional
        .into_iter()
        .chain(
            arguments
                .iter()
                .map(|argument| argument.as_ref())
                .filter(|argument| argument.position().is_none()),
        )
        .flat_map(|argument| argument.render())
        .collect()
}
