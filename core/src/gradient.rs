/*
    spotify-genres-rs | Genre taxonomy analysis for Spotify listening history.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::taxonomy::normalize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Gradient used for names missing from the table.
pub const FALLBACK_GRADIENT: &str = "linear-gradient(to right, #666, #999)";

const BUILTIN_GRADIENTS: &[(&str, &str)] = &[
    ("rock", "linear-gradient(to right, #ff6f61, #ff9478)"),
    ("pop", "linear-gradient(to right, #90D5FF, #c6e8ff)"),
    ("r&b", "linear-gradient(to right, #88b04b, #a6c96a)"),
    ("electronic", "linear-gradient(to right, #009688, #33bbaa)"),
    ("hip hop", "linear-gradient(to right, #f7cac9, #fadcdc)"),
    ("hip-hop", "linear-gradient(to right, #f7cac9, #fadcdc)"),
    ("metal", "linear-gradient(to right, #505050, #6e6e6e)"),
    ("folk", "linear-gradient(to right, #8d5524, #b5773d)"),
    ("jazz", "linear-gradient(to right, #6b5b95, #8e78b0)"),
    ("reggae", "linear-gradient(to right, #33cc99, #66ddb3)"),
    ("blues", "linear-gradient(to right, #000080, #2e3cae)"),
    ("country", "linear-gradient(to right, #f4e2d8, #ba8b02)"),
    ("new age", "linear-gradient(to right, #a1c4fd, #c2e9fb)"),
    ("classical", "linear-gradient(to right, #fbc2eb, #a6c1ee)"),
    ("easy listening", "linear-gradient(to right, #fbd3e9, #bb377d)"),
    ("latin", "linear-gradient(to right, #ff9a9e, #fecfef)"),
    ("religious", "linear-gradient(to right, #c9d6ff, #e2e2e2)"),
    ("vocal", "linear-gradient(to right, #fbc7d4, #9796f0)"),
    ("indie", "linear-gradient(to right, #f6d365, #fda085)"),
    ("other", "linear-gradient(to right, #000080, #2e3cae)"),
];

#[derive(Error, Debug)]
pub enum GradientError {
    #[error("Failed to read gradient table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid gradient JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Presentation decoration for meta-genres. Never consulted for classification.
#[derive(Debug, Clone)]
pub struct GradientTable {
    gradients: HashMap<String, String>,
}

impl Default for GradientTable {
    fn default() -> Self {
        Self {
            gradients: BUILTIN_GRADIENTS
                .iter()
                .map(|(name, gradient)| (name.to_string(), gradient.to_string()))
                .collect(),
        }
    }
}

impl GradientTable {
    /// Built-in table extended (and overridden) by a JSON `{ "name": "gradient" }` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GradientError> {
        let contents = fs::read_to_string(path)?;
        let overrides: HashMap<String, String> = serde_json::from_str(&contents)?;

        let mut table = Self::default();
        table.extend(overrides);
        Ok(table)
    }

    pub fn extend<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, gradient) in entries {
            self.gradients.insert(normalize(name.as_ref()), gradient.into());
        }
    }

    pub fn gradient_for(&self, name: &str) -> &str {
        self.gradients
            .get(&normalize(name))
            .map(String::as_str)
            .unwrap_or(FALLBACK_GRADIENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let table = GradientTable::default();
        assert_eq!(
            table.gradient_for(" Rock "),
            "linear-gradient(to right, #ff6f61, #ff9478)"
        );
    }

    #[test]
    fn test_unknown_name_uses_fallback() {
        let table = GradientTable::default();
        assert_eq!(table.gradient_for("polka"), FALLBACK_GRADIENT);
    }

    #[test]
    fn test_other_has_its_own_gradient() {
        let table = GradientTable::default();
        assert_ne!(table.gradient_for("other"), FALLBACK_GRADIENT);
    }

    #[test]
    fn test_load_overrides_builtin_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r##"{{"Rock": "#000", "polka": "#fff"}}"##).unwrap();

        let table = GradientTable::load(file.path()).unwrap();
        assert_eq!(table.gradient_for("rock"), "#000");
        assert_eq!(table.gradient_for("polka"), "#fff");
        assert_eq!(
            table.gradient_for("jazz"),
            "linear-gradient(to right, #6b5b95, #8e78b0)"
        );
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            GradientTable::load(file.path()),
            Err(GradientError::Json(_))
        ));
    }
}
