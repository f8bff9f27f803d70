use std::collections::BTreeMap;

use color_eyre::{
    eyre::{eyre, Context, Result},
    Help,
};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use super::{PackageEntry, Recipe};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DispatchRule {
    pub pattern: String,
    pub recipe: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch<'a> {
    Recipe(&'a str, &'a Recipe),
    Generic,
}

/// Ordered table mapping package name patterns to recipes. The first
/// matching rule wins; names matching no rule take the generic path.
pub(crate) struct Dispatcher<'a> {
    rules: Vec<(GlobMatcher, &'a str, &'a Recipe)>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        rules: &'a [DispatchRule],
        recipes: &'a BTreeMap<String, Recipe>,
    ) -> Result<Dispatcher<'a>> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let matcher = Glob::new(&rule.pattern)
                .with_context(|| {
                    format!("Invalid dispatch pattern '{}' in 'blfs.dispatch'", rule.pattern)
                })?
                .compile_matcher();
            let (name, recipe) = recipes
                .get_key_value(rule.recipe.as_str())
                .ok_or_else(|| {
                    eyre!(
                        "Dispatch pattern '{}' refers to unknown recipe '{}'",
                        rule.pattern,
                        rule.recipe
                    )
                })
                .with_suggestion(|| {
                    format!(
                        "Define a recipe named '{}' under 'blfs.recipes'",
                        rule.recipe
                    )
                })?;
            compiled.push((matcher, name.as_str(), recipe));
        }
        Ok(Dispatcher { rules: compiled })
    }

    pub fn dispatch(&self, entry: &PackageEntry) -> Dispatch<'a> {
        self.rules
            .iter()
            .find(|(matcher, _, _)| matcher.is_match(entry.name.as_str()))
            .map(|(_, name, recipe)| Dispatch::Recipe(*name, *recipe))
            .unwrap_or(Dispatch::Generic)
    }
}
