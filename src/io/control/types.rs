//! io::control::types — value types produced by the control-file parser.
//!
//! Purpose
//! -------
//! Define the immutable [`ControlFile`] value and its record types: the
//! scalar control-data head, parameter groups, parameter data, observation
//! data, prior information, and the optional SVD, regularisation and model
//! I/O blocks.
//!
//! Invariants & assumptions
//! ------------------------
//! - Names, group names, transforms and keywords are lowercase.
//! - File names and the model command lines are kept verbatim.
//! - [`NamedRecords`] preserves file order and rejects duplicate names.
//!
//! Downstream usage
//! ----------------
//! - Reporting and plotting collaborators read these values through the
//!   name-indexed accessors on [`ControlFile`]; nothing here mutates after
//!   parsing.
use std::collections::HashMap;

use crate::errors::{PestError, PestResult};

/// Records that are keyed by a unique, lowercase name.
pub trait Named {
    fn name(&self) -> &str;
}

/// NamedRecords — ordered records with a name index.
///
/// Iteration order is the order records were inserted (file order).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRecords<T> {
    records: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for NamedRecords<T> {
    fn default() -> Self {
        NamedRecords { records: Vec::new(), index: HashMap::new() }
    }
}

impl<T: Named> NamedRecords<T> {
    /// Append `record`, failing with `DuplicateName` if its name is taken.
    pub(crate) fn insert(&mut self, record: T, section: &'static str) -> PestResult<()> {
        let name = record.name().to_string();
        if self.index.contains_key(&name) {
            return Err(PestError::DuplicateName { section, name });
        }
        self.index.insert(name, self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        let i = *self.index.get(name)?;
        self.records.get_mut(i)
    }

    /// Look up a record by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(&name.to_lowercase()).map(|&i| &self.records[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    /// Names in file order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name()).collect()
    }
}

impl<'a, T> IntoIterator for &'a NamedRecords<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ---- Control data ----

/// Scalar run-control settings from the fixed ten-line head.
///
/// Optional trailing fields are `None` when the file omits them. Keyword
/// flags are `true` only when the positive keyword appears.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlData {
    // line 3
    pub rstfle: String,
    pub pestmode: String,
    // line 4
    pub npar: usize,
    pub nobs: usize,
    pub npargp: usize,
    pub nprior: usize,
    pub nobsgp: usize,
    pub maxcompdim: Option<usize>,
    // line 5
    pub ntplfle: usize,
    pub ninsfle: usize,
    pub precis: String,
    pub dpoint: String,
    pub numcom: usize,
    pub jacfile: Option<i32>,
    pub messfile: Option<i32>,
    // line 6
    pub rlambda1: f64,
    pub rlamfac: f64,
    pub phiratsuf: f64,
    pub phiredlam: f64,
    pub numlam: i32,
    pub jacupdate: Option<i32>,
    pub lamforgive: bool,
    pub derforgive: bool,
    // line 7
    pub relparmax: f64,
    pub facparmax: f64,
    pub facorig: f64,
    pub iboundstick: Option<i32>,
    pub upvecbend: Option<i32>,
    // line 8
    pub phiredswh: f64,
    pub noptswitch: Option<i32>,
    pub splitswh: Option<f64>,
    pub doaui: bool,
    pub dosenreuse: bool,
    // line 9
    pub noptmax: i32,
    pub phiredstp: f64,
    pub nphistp: i32,
    pub nphinored: i32,
    pub relparstp: f64,
    pub nrelpar: i32,
    pub phistopthresh: Option<f64>,
    pub lastrun: Option<i32>,
    pub phiabandon: Option<f64>,
    // line 10
    pub icov: i32,
    pub icor: i32,
    pub ieig: i32,
    pub ires: Option<i32>,
    pub jcosave: bool,
    pub verboserec: bool,
    pub jcosaveitn: bool,
    pub reisaveitn: bool,
    pub parsaveitn: bool,
}

// ---- Parameters ----

/// How PEST transforms a parameter during estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterTransform {
    None,
    Log,
    Fixed,
    Tied,
}

impl ParameterTransform {
    pub(crate) fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ParameterTransform::None),
            "log" => Some(ParameterTransform::Log),
            "fixed" => Some(ParameterTransform::Fixed),
            "tied" => Some(ParameterTransform::Tied),
            _ => None,
        }
    }

    /// True for parameters that PEST adjusts (neither fixed nor tied).
    pub fn is_adjustable(&self) -> bool {
        matches!(self, ParameterTransform::None | ParameterTransform::Log)
    }
}

/// Type of limit applied to parameter changes per iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeLimit {
    Relative,
    Factor,
    /// `absolute(N)` with its numeric bound.
    Absolute(f64),
}

impl ChangeLimit {
    pub(crate) fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "relative" => Some(ChangeLimit::Relative),
            "factor" => Some(ChangeLimit::Factor),
            _ => {
                let inner = s.strip_prefix("absolute(")?.strip_suffix(')')?;
                crate::io::control::records::parse_f64(inner).map(ChangeLimit::Absolute)
            }
        }
    }
}

/// One `* parameter groups` record.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGroup {
    pub name: String,
    pub inctyp: String,
    pub derinc: f64,
    pub derinclb: f64,
    pub forcen: String,
    pub derincmul: f64,
    pub dermthd: String,
    pub splitthresh: Option<f64>,
    pub splitreldiff: Option<f64>,
    pub splitaction: Option<String>,
}

impl Named for ParameterGroup {
    fn name(&self) -> &str {
        &self.name
    }
}

/// One `* parameter data` record.
///
/// `tied_to` is filled from the tied-parameter lines that follow the main
/// records and is `Some` only for `tied` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterData {
    pub name: String,
    pub transform: ParameterTransform,
    pub change_limit: ChangeLimit,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
    pub group: String,
    pub scale: f64,
    pub offset: f64,
    pub dercom: i32,
    pub tied_to: Option<String>,
}

impl Named for ParameterData {
    fn name(&self) -> &str {
        &self.name
    }
}

// ---- Observations ----

/// One `* observation data` record.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationData {
    pub name: String,
    pub value: f64,
    pub weight: f64,
    pub group: String,
}

impl Named for ObservationData {
    fn name(&self) -> &str {
        &self.name
    }
}

/// One (possibly `&`-continued) `* prior information` record.
///
/// `equation` is the left-hand side as written, lowercased, without the
/// trailing `=`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorInformation {
    pub name: String,
    pub equation: String,
    pub value: f64,
    pub weight: f64,
    pub group: String,
}

impl Named for PriorInformation {
    fn name(&self) -> &str {
        &self.name
    }
}

// ---- Optional blocks ----

/// `* singular value decomposition` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SvdSettings {
    pub svdmode: i32,
    pub maxsing: usize,
    pub eigthresh: f64,
    pub eigwrite: i32,
}

/// `* regularisation` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Regularisation {
    pub phimlim: f64,
    pub phimaccept: f64,
    pub fracphim: Option<f64>,
    pub wfinit: f64,
    pub wfmin: f64,
    pub wfmax: f64,
    pub linreg: bool,
    pub regcontinue: bool,
    pub wffac: f64,
    pub wftol: f64,
    pub iregadj: Option<i32>,
}

/// `* model input/output` pairs, verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelIo {
    /// `(template file, model input file)` pairs.
    pub templates: Vec<(String, String)>,
    /// `(instruction file, model output file)` pairs.
    pub instructions: Vec<(String, String)>,
}

/// ControlFile — parsed PEST run-control file.
///
/// Purpose
/// -------
/// Hold every section of a control file as typed, immutable data. Declared
/// counts in `control` equal the number of records in the corresponding
/// collections.
///
/// Fields
/// ------
/// - `control`: scalar head settings.
/// - `pargroups`, `pardata`, `obsdata`, `prior`: name-indexed records.
/// - `obsgroups`: observation group names in file order.
/// - `svd`, `regularisation`: `Some` only when their section is present.
/// - `model_commands`: model command lines; `batchfile` is the first one
///   (empty when the section is absent).
/// - `model_io`: template and instruction file pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFile {
    pub control: ControlData,
    pub svd: Option<SvdSettings>,
    pub pargroups: NamedRecords<ParameterGroup>,
    pub pardata: NamedRecords<ParameterData>,
    pub obsgroups: Vec<String>,
    pub obsdata: NamedRecords<ObservationData>,
    pub model_commands: Vec<String>,
    pub batchfile: String,
    pub model_io: ModelIo,
    pub prior: NamedRecords<PriorInformation>,
    pub regularisation: Option<Regularisation>,
}

impl ControlFile {
    pub fn parameter(&self, name: &str) -> Option<&ParameterData> {
        self.pardata.get(name)
    }

    pub fn observation(&self, name: &str) -> Option<&ObservationData> {
        self.obsdata.get(name)
    }

    pub fn prior(&self, name: &str) -> Option<&PriorInformation> {
        self.prior.get(name)
    }

    pub fn parameter_group(&self, name: &str) -> Option<&ParameterGroup> {
        self.pargroups.get(name)
    }

    /// Parameter names in file order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.pardata.names()
    }

    /// Observation names in file order (prior information excluded).
    pub fn observation_names(&self) -> Vec<&str> {
        self.obsdata.names()
    }

    /// Parameters that PEST adjusts (neither fixed nor tied).
    pub fn adjustable_parameters(&self) -> impl Iterator<Item = &ParameterData> {
        self.pardata.iter().filter(|p| p.transform.is_adjustable())
    }

    /// True when the run carries regularisation: a regularisation block, a
    /// `regularisation` PESTMODE, or an observation group named `regul*`.
    pub fn has_regularisation(&self) -> bool {
        self.regularisation.is_some()
            || self.control.pestmode == "regularisation"
            || self.obsgroups.iter().any(|g| is_regularisation_group(g))
    }

    /// Observations (prior information excluded) belonging to `group`.
    pub fn observations_in_group<'a>(
        &'a self, group: &str,
    ) -> impl Iterator<Item = &'a ObservationData> + 'a {
        let group = group.to_lowercase();
        self.obsdata.iter().filter(move |o| o.group == group)
    }
}

/// Regularisation groups are identified by name.
pub fn is_regularisation_group(group: &str) -> bool {
    group.to_lowercase().contains("regul")
}
