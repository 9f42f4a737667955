use crate::error::AkgError;
use crate::ledger::ProvenanceEntry;

pub const FOLD_CHANGE_VOCABULARY: &[&str] = &[
    "log2",
    "lf2",
    "lfc2",
    "logfold2",
    "log2fc",
    "logfoldchange",
    "logfold",
    "lf",
    "logfc",
    "foldchange",
    "fc",
    "lfc",
    "fold",
    "expression",
    "enrichment",
    "estimate",
];

pub const GENE_VOCABULARY: &[&str] = &[
    "ensembl",
    "geneid",
    "symbol",
    "genesymbol",
    "genename",
    "entrez",
    "ncbi",
    "gene",
    "tf",
    "rna",
    "feature",
];

pub const PVALUE_VOCABULARY: &[&str] = &[
    "padj",
    "adjp",
    "pvalueadj",
    "adjpvalue",
    "pvaladj",
    "adjpval",
    "pvadj",
    "adjpv",
    "fdr",
    "fdrpval",
    "qvalue",
    "pvalue",
    "qval",
    "pval",
    "pv",
    "qv",
];

pub fn squeeze(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn canonicalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !"-_<>()[]{}".contains(*c))
        .collect()
}

pub fn matches_vocabulary(header: &str, vocabulary: &[&str]) -> bool {
    let squeezed = squeeze(header);
    vocabulary
        .iter()
        .any(|candidate| squeezed.contains(candidate))
}

pub fn detect_column(headers: &[String], vocabulary: &[&str]) -> Option<String> {
    detect_index(headers, vocabulary, &[]).map(|idx| headers[idx].clone())
}

fn detect_index(headers: &[String], vocabulary: &[&str], taken: &[usize]) -> Option<usize> {
    let squeezed = headers.iter().map(|h| squeeze(h)).collect::<Vec<_>>();
    vocabulary.iter().find_map(|candidate| {
        squeezed
            .iter()
            .enumerate()
            .find(|(idx, header)| !taken.contains(idx) && header.contains(candidate))
            .map(|(idx, _)| idx)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Gene,
    FoldChange,
    PValue,
}

impl Role {
    pub fn vocabulary(self) -> &'static [&'static str] {
        match self {
            Role::Gene => GENE_VOCABULARY,
            Role::FoldChange => FOLD_CHANGE_VOCABULARY,
            Role::PValue => PVALUE_VOCABULARY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Gene => "gene",
            Role::FoldChange => "fold change",
            Role::PValue => "p-value",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleOverrides {
    pub gene: String,
    pub fold_change: String,
    pub pvalue: String,
}

impl RoleOverrides {
    pub fn from_entry(entry: &ProvenanceEntry) -> Self {
        Self {
            gene: entry.gene_column.trim().to_string(),
            fold_change: entry.lfc_column.trim().to_string(),
            pvalue: entry.pvalue_column.trim().to_string(),
        }
    }

    fn get(&self, role: Role) -> &str {
        match role {
            Role::Gene => &self.gene,
            Role::FoldChange => &self.fold_change,
            Role::PValue => &self.pvalue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub name: String,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnRoles {
    pub gene: Option<ResolvedColumn>,
    pub fold_change: Option<ResolvedColumn>,
    pub pvalue: Option<ResolvedColumn>,
}

impl ColumnRoles {
    pub fn is_empty(&self) -> bool {
        self.gene.is_none() && self.fold_change.is_none() && self.pvalue.is_none()
    }

    pub fn max_index(&self) -> Option<usize> {
        [&self.gene, &self.fold_change, &self.pvalue]
            .into_iter()
            .flatten()
            .map(|column| column.index)
            .max()
    }

    fn slot(&mut self, role: Role) -> &mut Option<ResolvedColumn> {
        match role {
            Role::Gene => &mut self.gene,
            Role::FoldChange => &mut self.fold_change,
            Role::PValue => &mut self.pvalue,
        }
    }
}

pub fn find_header(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header == name)
        .or_else(|| {
            headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(name.trim()))
        })
}

/// Resolves gene, then fold change, then p-value. Overrides are applied first and
/// must name an existing header; a header serves at most one role.
pub fn resolve_roles(
    headers: &[String],
    overrides: &RoleOverrides,
) -> Result<ColumnRoles, AkgError> {
    const ORDER: [Role; 3] = [Role::Gene, Role::FoldChange, Role::PValue];
    let mut roles = ColumnRoles::default();
    let mut taken = Vec::new();

    for role in ORDER {
        let name = overrides.get(role);
        if name.is_empty() {
            continue;
        }
        let index = find_header(headers, name).ok_or_else(|| {
            AkgError::Configuration(format!(
                "{} column override '{name}' is not in the header",
                role.label()
            ))
        })?;
        if taken.contains(&index) {
            return Err(AkgError::Configuration(format!(
                "column '{name}' is pinned to more than one role"
            )));
        }
        taken.push(index);
        *roles.slot(role) = Some(ResolvedColumn {
            name: headers[index].clone(),
            index,
        });
    }

    for role in ORDER {
        if roles.slot(role).is_some() {
            continue;
        }
        if let Some(index) = detect_index(headers, role.vocabulary(), &taken) {
            taken.push(index);
            *roles.slot(role) = Some(ResolvedColumn {
                name: headers[index].clone(),
                index,
            });
        }
    }
    Ok(roles)
}
