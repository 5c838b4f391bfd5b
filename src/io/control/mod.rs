//! io::control — PEST control-file (`.pst`) parser.
//!
//! Purpose
//! -------
//! Parse a PEST run-control file into an immutable [`ControlFile`]: the
//! fixed control-data head plus every tag-delimited body section that the
//! post-processing engines and reporting collaborators need.
//!
//! Key behaviors
//! -------------
//! - Skip comment lines (blank, `#…`, `++…`) everywhere.
//! - Read a fixed ten-line head: `pcf`, `* control data`, then eight rows of
//!   scalar settings (see [`ControlData`]).
//! - Locate body sections by a case-insensitive substring match on tag lines
//!   (lines starting with `*`). Each recognised section consumes exactly its
//!   declared record count; no tag scanning happens inside a body, so record
//!   text that merely contains a section name is never misread as a tag.
//! - Skip unrecognised sections (e.g. `* predictive analysis`) up to the next
//!   tag.
//! - Accept `&`-continued prior-information records and the tied-parameter
//!   lines that follow `* parameter data`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Declared NPAR/NOBS/NPARGP/NOBSGP/NPRIOR equal the number of records
//!   stored for each section; any disagreement is an error.
//! - Required sections: control data, parameter data, observation groups,
//!   observation data. An optional section whose declared count is positive
//!   must be present.
//! - Parsing fails fast on the first anomaly; there is no partial result.
//!
//! Conventions
//! -----------
//! - Names, group names, transforms and keywords are lowercased; file names
//!   and model command lines are kept verbatim.
//! - Errors carry 1-based physical line numbers and, for typed fields, the
//!   PEST field name (e.g. `PARVAL1`).
//!
//! Downstream usage
//! ----------------
//! - `let pst = io::control::parse("case.pst")?;` then size the Jacobian
//!   read with `pst.control.npar` and `pst.control.nobs + pst.control.nprior`.
//! - [`ControlFile`] also acts as a weight source for sensitivity analysis
//!   (see `sensitivity::WeightSource`).
//!
//! Testing notes
//! -------------
//! - Unit tests parse a hand-built minimal control file and compare every
//!   field against its literal, and exercise each error path.
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use crate::errors::{PestError, PestResult};

pub(crate) mod records;
pub mod types;

pub use self::types::{
    ChangeLimit, ControlData, ControlFile, ModelIo, Named, NamedRecords, ObservationData,
    ParameterData, ParameterGroup, ParameterTransform, PriorInformation, Regularisation,
    SvdSettings, is_regularisation_group,
};

use self::records::{Line, Record, content_lines, parse_f64};

const CONTROL_DATA: &str = "control data";
const HEAD_LINES: usize = 10;

/// Parse the control file at `path`.
///
/// Errors
/// ------
/// - `PestError::Io` when the file cannot be read.
/// - Format errors (`MissingSection`, `UnexpectedTag`, `DuplicateSection`,
///   `InvalidHeader`) for bad tag structure.
/// - Schema errors (`FieldCount`, `FieldType`, `CountMismatch`,
///   `DuplicateName`, `UnknownParameter`) for bad records.
pub fn parse(path: impl AsRef<Path>) -> PestResult<ControlFile> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| PestError::io(path, e))?;
    let pst = parse_str(&text)?;
    log::info!(
        "loaded control file {} ({} parameters, {} observations, {} prior)",
        path.display(),
        pst.pardata.len(),
        pst.obsdata.len(),
        pst.prior.len()
    );
    Ok(pst)
}

/// Parse control-file text held in memory.
pub fn parse_str(text: &str) -> PestResult<ControlFile> {
    let mut parser = Parser { lines: content_lines(text), pos: 0 };
    let control = parser.head()?;
    parser.body(control)
}

impl FromStr for ControlFile {
    type Err = PestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_str(s)
    }
}

// ---- Sections ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    Svd,
    ParameterGroups,
    ParameterData,
    ObservationGroups,
    ObservationData,
    ModelCommandLine,
    ModelIo,
    PriorInformation,
    Regularisation,
}

impl Section {
    const ALL: [Section; 9] = [
        Section::Svd,
        Section::ParameterGroups,
        Section::ParameterData,
        Section::ObservationGroups,
        Section::ObservationData,
        Section::ModelCommandLine,
        Section::ModelIo,
        Section::PriorInformation,
        Section::Regularisation,
    ];

    fn tag(self) -> &'static str {
        match self {
            Section::Svd => "singular value decomposition",
            Section::ParameterGroups => "parameter groups",
            Section::ParameterData => "parameter data",
            Section::ObservationGroups => "observation groups",
            Section::ObservationData => "observation data",
            Section::ModelCommandLine => "model command line",
            Section::ModelIo => "model input/output",
            Section::PriorInformation => "prior information",
            Section::Regularisation => "regularisation",
        }
    }

    fn recognise(tag_line: &str) -> Option<Section> {
        let lower = tag_line.to_lowercase();
        if lower.contains("regularization") {
            return Some(Section::Regularisation);
        }
        Section::ALL.into_iter().find(|s| lower.contains(s.tag()))
    }
}

/// Sections collected while walking the body.
#[derive(Default)]
struct Body {
    svd: Option<SvdSettings>,
    pargroups: Option<NamedRecords<ParameterGroup>>,
    pardata: Option<NamedRecords<ParameterData>>,
    obsgroups: Option<Vec<String>>,
    obsdata: Option<NamedRecords<ObservationData>>,
    model_commands: Option<Vec<String>>,
    model_io: Option<ModelIo>,
    prior: Option<NamedRecords<PriorInformation>>,
    regularisation: Option<Regularisation>,
}

struct Parser<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    /// Line number reported when input ends inside a section.
    fn end_line(&self) -> usize {
        self.lines.last().map_or(1, |l| l.number + 1)
    }

    /// Next record line of `section`; a tag or end of input is an error.
    fn record_line(&mut self, section: &'static str) -> PestResult<Line<'a>> {
        match self.peek() {
            None => Err(PestError::UnexpectedTag { section, line: self.end_line() }),
            Some(l) if l.is_tag() => Err(PestError::UnexpectedTag { section, line: l.number }),
            Some(l) => {
                self.pos += 1;
                Ok(l)
            }
        }
    }

    fn record(&mut self, section: &'static str) -> PestResult<Record<'a>> {
        Ok(Record::new(self.record_line(section)?, section))
    }

    /// Number of non-tag lines from the cursor to the next tag.
    fn count_until_tag(&self) -> usize {
        self.lines[self.pos..].iter().take_while(|l| !l.is_tag()).count()
    }

    fn skip_to_tag(&mut self) {
        self.pos += self.count_until_tag();
    }

    // ---- Head ----

    fn head(&mut self) -> PestResult<ControlData> {
        let first = self.peek().ok_or_else(|| PestError::InvalidHeader {
            line: 1,
            reason: "empty control file".to_string(),
        })?;
        if !first.text.trim().to_lowercase().starts_with("pcf") {
            return Err(PestError::InvalidHeader {
                line: first.number,
                reason: "first line must be 'pcf'".to_string(),
            });
        }
        self.pos += 1;
        match self.peek() {
            Some(l) if l.is_tag() && l.text.to_lowercase().contains(CONTROL_DATA) => self.pos += 1,
            _ => return Err(PestError::MissingSection { section: CONTROL_DATA }),
        }

        let r3 = self.record(CONTROL_DATA)?;
        r3.require(2)?;
        let r4 = self.record(CONTROL_DATA)?;
        r4.require(5)?;
        let r5 = self.record(CONTROL_DATA)?;
        r5.require(4)?;
        let r6 = self.record(CONTROL_DATA)?;
        r6.require(5)?;
        let r7 = self.record(CONTROL_DATA)?;
        r7.require(3)?;
        let r8 = self.record(CONTROL_DATA)?;
        r8.require(1)?;
        let r9 = self.record(CONTROL_DATA)?;
        r9.require(6)?;
        let r10 = self.record(CONTROL_DATA)?;
        r10.require(3)?;
        debug_assert_eq!(self.pos, HEAD_LINES);

        // PHIREDSWH is followed by NOPTSWITCH and SPLITSWH (numeric) and
        // the AUI/SENREUSE keywords, in any mix.
        let numeric8: Vec<&str> =
            r8.tokens().iter().skip(1).copied().filter(|t| parse_f64(t).is_some()).collect();
        let noptswitch = match numeric8.first() {
            Some(t) => Some(t.parse::<i32>().map_err(|_| r8.type_error("NOPTSWITCH", t))?),
            None => None,
        };
        let splitswh = numeric8.get(1).and_then(|t| parse_f64(t));

        let control = ControlData {
            rstfle: r3.lower(0),
            pestmode: r3.lower(1),
            npar: r4.int(0, "NPAR")?,
            nobs: r4.int(1, "NOBS")?,
            npargp: r4.int(2, "NPARGP")?,
            nprior: r4.int(3, "NPRIOR")?,
            nobsgp: r4.int(4, "NOBSGP")?,
            maxcompdim: r4.opt_int(5, "MAXCOMPDIM")?,
            ntplfle: r5.int(0, "NTPLFLE")?,
            ninsfle: r5.int(1, "NINSFLE")?,
            precis: r5.lower(2),
            dpoint: r5.lower(3),
            numcom: r5.opt_int(4, "NUMCOM")?.unwrap_or(1),
            jacfile: r5.opt_int(5, "JACFILE")?,
            messfile: r5.opt_int(6, "MESSFILE")?,
            rlambda1: r6.float(0, "RLAMBDA1")?,
            rlamfac: r6.float(1, "RLAMFAC")?,
            phiratsuf: r6.float(2, "PHIRATSUF")?,
            phiredlam: r6.float(3, "PHIREDLAM")?,
            numlam: r6.int(4, "NUMLAM")?,
            jacupdate: r6.raw(5).and_then(|t| t.parse::<i32>().ok()),
            lamforgive: r6.has_keyword(5, "lamforgive"),
            derforgive: r6.has_keyword(5, "derforgive"),
            relparmax: r7.float(0, "RELPARMAX")?,
            facparmax: r7.float(1, "FACPARMAX")?,
            facorig: r7.float(2, "FACORIG")?,
            iboundstick: r7.opt_int(3, "IBOUNDSTICK")?,
            upvecbend: r7.opt_int(4, "UPVECBEND")?,
            phiredswh: r8.float(0, "PHIREDSWH")?,
            noptswitch,
            splitswh,
            doaui: r8.has_keyword(1, "aui"),
            dosenreuse: r8.has_keyword(1, "senreuse"),
            noptmax: r9.int(0, "NOPTMAX")?,
            phiredstp: r9.float(1, "PHIREDSTP")?,
            nphistp: r9.int(2, "NPHISTP")?,
            nphinored: r9.int(3, "NPHINORED")?,
            relparstp: r9.float(4, "RELPARSTP")?,
            nrelpar: r9.int(5, "NRELPAR")?,
            phistopthresh: r9.opt_float(6, "PHISTOPTHRESH")?,
            lastrun: r9.opt_int(7, "LASTRUN")?,
            phiabandon: r9.raw(8).and_then(parse_f64),
            icov: r10.int(0, "ICOV")?,
            icor: r10.int(1, "ICOR")?,
            ieig: r10.int(2, "IEIG")?,
            ires: r10.raw(3).and_then(|t| t.parse::<i32>().ok()),
            jcosave: r10.has_keyword(3, "jcosave"),
            verboserec: r10.has_keyword(3, "verboserec"),
            jcosaveitn: r10.has_keyword(3, "jcosaveitn"),
            reisaveitn: r10.has_keyword(3, "reisaveitn"),
            parsaveitn: r10.has_keyword(3, "parsaveitn"),
        };
        log::debug!(
            "control data: npar={} nobs={} npargp={} nprior={} nobsgp={}",
            control.npar,
            control.nobs,
            control.npargp,
            control.nprior,
            control.nobsgp
        );
        Ok(control)
    }

    // ---- Body ----

    fn body(&mut self, control: ControlData) -> PestResult<ControlFile> {
        let mut body = Body::default();
        let mut seen: HashSet<Section> = HashSet::new();
        // Section and declared record count of the last recognised body.
        let mut last: Option<(&'static str, usize)> = None;

        while let Some(line) = self.peek() {
            if !line.is_tag() {
                return Err(match last {
                    Some((section, declared)) => PestError::CountMismatch {
                        section,
                        declared,
                        found: declared + self.count_until_tag(),
                    },
                    None => PestError::UnexpectedTag { section: CONTROL_DATA, line: line.number },
                });
            }
            self.pos += 1;

            if line.text.to_lowercase().contains(CONTROL_DATA) {
                return Err(PestError::DuplicateSection { section: CONTROL_DATA, line: line.number });
            }
            let Some(section) = Section::recognise(line.text) else {
                log::debug!("skipping unrecognised section '{}' at line {}", line.text.trim(), line.number);
                self.skip_to_tag();
                last = None;
                continue;
            };
            if !seen.insert(section) {
                return Err(PestError::DuplicateSection { section: section.tag(), line: line.number });
            }
            log::debug!("section '{}' at line {}", section.tag(), line.number);

            let declared = self.section(section, &control, &mut body)?;
            last = Some((section.tag(), declared));
        }

        finish(control, body)
    }

    /// Parse one recognised section body; returns its declared record count.
    fn section(
        &mut self, section: Section, control: &ControlData, body: &mut Body,
    ) -> PestResult<usize> {
        let tag = section.tag();
        let declared = match section {
            Section::Svd => {
                body.svd = Some(self.svd()?);
                3
            }
            Section::ParameterGroups => {
                let mut groups = NamedRecords::default();
                for _ in 0..control.npargp {
                    groups.insert(parameter_group(&self.record(tag)?)?, tag)?;
                }
                body.pargroups = Some(groups);
                control.npargp
            }
            Section::ParameterData => {
                body.pardata = Some(self.parameter_data(control.npar)?);
                control.npar
            }
            Section::ObservationGroups => {
                let mut names = Vec::with_capacity(control.nobsgp);
                let mut unique = HashSet::new();
                for _ in 0..control.nobsgp {
                    let rec = self.record(tag)?;
                    rec.require(1)?;
                    let name = rec.lower(0);
                    if !unique.insert(name.clone()) {
                        return Err(PestError::DuplicateName { section: tag, name });
                    }
                    names.push(name);
                }
                body.obsgroups = Some(names);
                control.nobsgp
            }
            Section::ObservationData => {
                let mut obs = NamedRecords::default();
                for _ in 0..control.nobs {
                    obs.insert(observation(&self.record(tag)?)?, tag)?;
                }
                body.obsdata = Some(obs);
                control.nobs
            }
            Section::ModelCommandLine => {
                let mut commands = Vec::with_capacity(control.numcom);
                for _ in 0..control.numcom {
                    commands.push(self.record_line(tag)?.text.trim().to_string());
                }
                body.model_commands = Some(commands);
                control.numcom
            }
            Section::ModelIo => {
                let mut io = ModelIo::default();
                for _ in 0..control.ntplfle {
                    io.templates.push(file_pair(&self.record(tag)?)?);
                }
                for _ in 0..control.ninsfle {
                    io.instructions.push(file_pair(&self.record(tag)?)?);
                }
                body.model_io = Some(io);
                control.ntplfle + control.ninsfle
            }
            Section::PriorInformation => {
                body.prior = Some(self.prior(control.nprior)?);
                control.nprior
            }
            Section::Regularisation => {
                body.regularisation = Some(self.regularisation()?);
                3
            }
        };
        Ok(declared)
    }

    fn svd(&mut self) -> PestResult<SvdSettings> {
        let tag = Section::Svd.tag();
        let r1 = self.record(tag)?;
        let r2 = self.record(tag)?;
        let r3 = self.record(tag)?;
        Ok(SvdSettings {
            svdmode: r1.int(0, "SVDMODE")?,
            maxsing: r2.int(0, "MAXSING")?,
            eigthresh: r2.float(1, "EIGTHRESH")?,
            eigwrite: r3.int(0, "EIGWRITE")?,
        })
    }

    fn regularisation(&mut self) -> PestResult<Regularisation> {
        let tag = Section::Regularisation.tag();
        let r1 = self.record(tag)?;
        let r2 = self.record(tag)?;
        let r3 = self.record(tag)?;
        Ok(Regularisation {
            phimlim: r1.float(0, "PHIMLIM")?,
            phimaccept: r1.float(1, "PHIMACCEPT")?,
            fracphim: r1.opt_float(2, "FRACPHIM")?,
            wfinit: r2.float(0, "WFINIT")?,
            wfmin: r2.float(1, "WFMIN")?,
            wfmax: r2.float(2, "WFMAX")?,
            linreg: r2.has_keyword(3, "linreg"),
            regcontinue: r2.has_keyword(3, "continue"),
            wffac: r3.float(0, "WFFAC")?,
            wftol: r3.float(1, "WFTOL")?,
            iregadj: r3.opt_int(2, "IREGADJ")?,
        })
    }

    fn parameter_data(&mut self, npar: usize) -> PestResult<NamedRecords<ParameterData>> {
        let tag = Section::ParameterData.tag();
        let mut pars = NamedRecords::default();
        for _ in 0..npar {
            pars.insert(parameter(&self.record(tag)?)?, tag)?;
        }

        // One `PARNME PARTIED` line per tied parameter follows the records.
        let n_tied = pars.iter().filter(|p| p.transform == ParameterTransform::Tied).count();
        for _ in 0..n_tied {
            let rec = self.record(tag)?;
            rec.require(2)?;
            let (child, parent) = (rec.lower(0), rec.lower(1));
            if !pars.contains(&parent) {
                return Err(PestError::UnknownParameter { name: parent });
            }
            match pars.get_mut(&child) {
                Some(p) => p.tied_to = Some(parent),
                None => return Err(PestError::UnknownParameter { name: child }),
            }
        }
        Ok(pars)
    }

    fn prior(&mut self, nprior: usize) -> PestResult<NamedRecords<PriorInformation>> {
        let tag = Section::PriorInformation.tag();
        let mut prior = NamedRecords::default();
        for _ in 0..nprior {
            let first = self.record_line(tag)?;
            if first.is_continuation() {
                return Err(PestError::UnexpectedTag { section: tag, line: first.number });
            }
            let mut tokens: Vec<&str> = first.text.split_whitespace().collect();
            while let Some(next) = self.peek().filter(|l| l.is_continuation()) {
                tokens.extend(next.text.trim_start().trim_start_matches('&').split_whitespace());
                self.pos += 1;
            }
            let rec = Record::from_tokens(first.number, tag, tokens);
            prior.insert(prior_record(&rec)?, tag)?;
        }
        Ok(prior)
    }
}

// ---- Records ----

fn parameter_group(rec: &Record<'_>) -> PestResult<ParameterGroup> {
    rec.require(7)?;
    Ok(ParameterGroup {
        name: rec.lower(0),
        inctyp: rec.lower(1),
        derinc: rec.float(2, "DERINC")?,
        derinclb: rec.float(3, "DERINCLB")?,
        forcen: rec.lower(4),
        derincmul: rec.float(5, "DERINCMUL")?,
        dermthd: rec.lower(6),
        splitthresh: rec.opt_float(7, "SPLITTHRESH")?,
        splitreldiff: rec.opt_float(8, "SPLITRELDIFF")?,
        splitaction: rec.raw(9).map(str::to_lowercase),
    })
}

fn parameter(rec: &Record<'_>) -> PestResult<ParameterData> {
    rec.require(9)?;
    let transform_raw = rec.lower(1);
    let transform = ParameterTransform::from_keyword(&transform_raw)
        .ok_or_else(|| rec.type_error("PARTRANS", &transform_raw))?;
    let limit_raw = rec.lower(2);
    let change_limit =
        ChangeLimit::from_keyword(&limit_raw).ok_or_else(|| rec.type_error("PARCHGLIM", &limit_raw))?;
    Ok(ParameterData {
        name: rec.lower(0),
        transform,
        change_limit,
        value: rec.float(3, "PARVAL1")?,
        lower: rec.float(4, "PARLBND")?,
        upper: rec.float(5, "PARUBND")?,
        group: rec.lower(6),
        scale: rec.float(7, "SCALE")?,
        offset: rec.float(8, "OFFSET")?,
        dercom: rec.opt_int(9, "DERCOM")?.unwrap_or(1),
        tied_to: None,
    })
}

fn observation(rec: &Record<'_>) -> PestResult<ObservationData> {
    rec.require(4)?;
    Ok(ObservationData {
        name: rec.lower(0),
        value: rec.float(1, "OBSVAL")?,
        weight: rec.float(2, "WEIGHT")?,
        group: rec.lower(3),
    })
}

/// `PILBL <equation> = PIVAL WEIGHT OBGNME`
fn prior_record(rec: &Record<'_>) -> PestResult<PriorInformation> {
    rec.require(5)?;
    let n = rec.len();
    let lhs = &rec.tokens()[1..n - 3];
    let lhs = match lhs.split_last() {
        Some((&"=", rest)) => rest,
        _ => lhs,
    };
    Ok(PriorInformation {
        name: rec.lower(0),
        equation: lhs.join(" ").to_lowercase(),
        value: rec.float(n - 3, "PIVAL")?,
        weight: rec.float(n - 2, "WEIGHT")?,
        group: rec.lower(n - 1),
    })
}

fn file_pair(rec: &Record<'_>) -> PestResult<(String, String)> {
    rec.require(2)?;
    let first = rec.raw(0).unwrap_or_default().to_string();
    let second = rec.raw(1).unwrap_or_default().to_string();
    Ok((first, second))
}

/// Check required sections and declared counts, then assemble the value.
fn finish(control: ControlData, body: Body) -> PestResult<ControlFile> {
    let pardata = body.pardata.ok_or(PestError::MissingSection { section: "parameter data" })?;
    let obsgroups =
        body.obsgroups.ok_or(PestError::MissingSection { section: "observation groups" })?;
    let obsdata =
        body.obsdata.ok_or(PestError::MissingSection { section: "observation data" })?;

    let pargroups = optional(body.pargroups, "parameter groups", control.npargp)?;
    let prior = optional(body.prior, "prior information", control.nprior)?;
    let model_io = match body.model_io {
        Some(io) => io,
        None if control.ntplfle + control.ninsfle > 0 => {
            return Err(PestError::CountMismatch {
                section: "model input/output",
                declared: control.ntplfle + control.ninsfle,
                found: 0,
            });
        }
        None => ModelIo::default(),
    };
    let model_commands = body.model_commands.unwrap_or_default();
    let batchfile = model_commands.first().cloned().unwrap_or_default();

    let pst = ControlFile {
        control,
        svd: body.svd,
        pargroups,
        pardata,
        obsgroups,
        obsdata,
        model_commands,
        batchfile,
        model_io,
        prior,
        regularisation: body.regularisation,
    };
    if pst.has_regularisation() {
        log::debug!("control file carries regularisation");
    }
    Ok(pst)
}

fn optional<T: Named>(
    records: Option<NamedRecords<T>>, section: &'static str, declared: usize,
) -> PestResult<NamedRecords<T>> {
    match records {
        Some(r) => Ok(r),
        None if declared > 0 => Err(PestError::CountMismatch { section, declared, found: 0 }),
        None => Ok(NamedRecords::default()),
    }
}
