//! Offense catalog.
//!
//! The hierarchy (category -> second-order group -> first-order offense)
//! is the canonical catalog. The flat wizard walks its flattened list, or
//! the shorter legacy list the first release of the survey used.

use serde::{Deserialize, Serialize};

/// A group of closely related offenses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondOrderGroup {
    pub name: String,
    pub offenses: Vec<String>,
}

/// A top-level offense category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub description: String,
    pub groups: Vec<SecondOrderGroup>,
}

/// Which offense list a flat run or the statistics table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    /// Every first-order offense of the hierarchy.
    #[default]
    Hierarchy,
    /// The nine offenses of the first flat survey.
    Legacy,
}

const LEGACY_OFFENSES: &[&str] = &[
    "Driving While Intoxicated (DWI)",
    "Simple Assault",
    "Disorderly Conduct",
    "Forgery/Fraud",
    "Distribution of Amphetamines",
    "Burglary",
    "Possession of Marijuana",
    "Parole Violation",
    "Voluntary Manslaughter",
];

type RawGroup = (&'static str, &'static [&'static str]);

const HIERARCHY: &[(&str, &str, &[RawGroup])] = &[
    (
        "Drug",
        "Drug-related offenses",
        &[
            (
                "Distribution of Controlled Substances",
                &[
                    "Distribution of Controlled Substances",
                    "Distribution of Marijuana",
                ],
            ),
            (
                "Possession/Use of Controlled Substances",
                &[
                    "Possession/Use of Marijuana",
                    "Possession/Use of Controlled Substances (non-marijuana)",
                    "Drug Paraphernalia",
                ],
            ),
        ],
    ),
    (
        "Driving",
        "Driving-related offenses",
        &[("Driving While Intoxicated", &["Driving While Intoxicated"])],
    ),
    (
        "Public Order",
        "Public order offenses",
        &[
            (
                "Family or Child Custody Related Offense",
                &["Family or Child Custody Related Offense"],
            ),
            (
                "Disorderly Conduct / Criminal Trespass",
                &[
                    "Invasion of Privacy",
                    "Criminal Trespass",
                    "Disorderly Conduct",
                    "Liquor Law Violation",
                ],
            ),
            (
                "Court/Legal System Violation",
                &[
                    "Contempt of Court / Violate Court Order",
                    "Obstruction/Resisting",
                    "Bribery/Conflict of Interest",
                    "Escape from Custody / Prosecution",
                ],
            ),
            (
                "Weapons Offense - Nonviolent",
                &["Weapons Offense - Nonviolent"],
            ),
            (
                "Parole or Probation Violation",
                &["Parole or Probation Violation"],
            ),
            ("Immigration Violation", &["Immigration Violation"]),
            ("Prostitution", &["Prostitution / Commercialized Vice"]),
        ],
    ),
    (
        "Property",
        "Property-related offenses",
        &[
            (
                "Burglary/Theft",
                &[
                    "Burglary",
                    "Petty Theft (=<$500)",
                    "Grand Theft (>$500)",
                    "Sale or Receiving of Stolen Property",
                    "Destruction of Property",
                ],
            ),
            (
                "Forgery, Fraud & Financial Crimes",
                &["Forgery, Fraud & Financial Crimes"],
            ),
            ("Arson", &["Arson"]),
        ],
    ),
    (
        "Violence",
        "Violent offenses",
        &[
            ("Extortion/Threat", &["Extortion/Threat"]),
            ("Murder", &["Murder"]),
            (
                "Manslaughter",
                &[
                    "Voluntary Manslaughter",
                    "Vehicular Manslaughter",
                    "Involuntary Manslaughter",
                ],
            ),
            (
                "Rape/Sexual Assault",
                &["Rape/Sexual Assault", "Child Molestation"],
            ),
            ("Statutory Rape", &["Statutory Rape"]),
            (
                "Kidnapping/Human Trafficking",
                &["Human Trafficking", "Kidnapping"],
            ),
            ("Child Abuse", &["Child Abuse"]),
            ("Robbery", &["Robbery"]),
            (
                "Assault",
                &["Aggravated Assault", "Simple Assault", "Hit and Run"],
            ),
        ],
    ),
];

/// The full offense hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub categories: Vec<Category>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::hierarchy()
    }
}

impl Catalog {
    /// The built-in offense hierarchy.
    pub fn hierarchy() -> Self {
        let categories = HIERARCHY
            .iter()
            .map(|(name, description, groups)| Category {
                name: name.to_string(),
                description: description.to_string(),
                groups: groups
                    .iter()
                    .map(|(group, offenses)| SecondOrderGroup {
                        name: group.to_string(),
                        offenses: offenses.iter().map(|o| o.to_string()).collect(),
                    })
                    .collect(),
            })
            .collect();
        Self { categories }
    }

    /// The nine-offense list of the first flat survey.
    pub fn legacy_flat() -> Vec<String> {
        LEGACY_OFFENSES.iter().map(|o| o.to_string()).collect()
    }

    /// Offense list for the flat wizard and the statistics table.
    pub fn offense_list(kind: CatalogKind) -> Vec<String> {
        match kind {
            CatalogKind::Hierarchy => Self::hierarchy().flatten(),
            CatalogKind::Legacy => Self::legacy_flat(),
        }
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn group(&self, category: &str, group: &str) -> Option<&SecondOrderGroup> {
        self.category(category)?
            .groups
            .iter()
            .find(|g| g.name == group)
    }

    /// Number of second-order groups in a category (0 if unknown).
    pub fn total_groups(&self, category: &str) -> usize {
        self.category(category).map_or(0, |c| c.groups.len())
    }

    /// Number of first-order offenses in a group (0 if unknown).
    pub fn total_offenses(&self, category: &str, group: &str) -> usize {
        self.group(category, group).map_or(0, |g| g.offenses.len())
    }

    /// First-order offenses in catalog order, without duplicates.
    pub fn flatten(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for offense in self
            .categories
            .iter()
            .flat_map(|c| c.groups.iter())
            .flat_map(|g| g.offenses.iter())
        {
            if !out.contains(offense) {
                out.push(offense.clone());
            }
        }
        out
    }
}
