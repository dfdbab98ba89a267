//! Simulation parameters, and the parameter file format they are read from.
//!
//! A parameter file holds one `name value...` entry per line; blank lines
//! and everything following a `#` are ignored. Every physical parameter is
//! required; only `outfile` may be omitted. For example:
//!
//! ```text
//! nx 10
//! ny 10
//! nlevels 2
//! models S C        # or the compact form: models SC
//! nzs 1 4
//! rho 1.0
//! beta 0 0 0
//! gamma_down 1 0 0 0 1 0 0 0 1
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, Deserializer, IntoDeserializer, Visitor};
use serde::{Deserialize, Serialize};
use crate::error::{Result, ValidationError};
use crate::hydro::Model;




/**
 * The full set of parameters from which a `Sea` is constructed.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeaParams {
    /// Interior cells of the coarsest level in x and y.
    pub nx: usize,
    pub ny: usize,
    /// Number of coarse time steps.
    pub nt: usize,
    /// Ghost cells on each side of every level.
    pub ng: usize,
    /// Refinement ratio between consecutive levels.
    pub r: usize,
    /// Fraction of each parent level covered by its child.
    pub df: f32,
    pub nlevels: usize,
    pub models: Vec<Model>,
    /// Cells (or layers) in z, per level.
    pub nzs: Vec<usize>,
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
    pub zmin: f32,
    pub zmax: f32,
    /// Density of each shallow water layer, top first.
    pub rho: Vec<f32>,
    /// Mass transfer rate.
    #[serde(rename = "Q")]
    pub q: f32,
    /// Adiabatic index.
    pub gamma: f32,
    /// Energy release per unit mass of helium burning.
    #[serde(rename = "E_He")]
    pub e_he: f32,
    /// Specific heat at constant volume.
    #[serde(rename = "Cv")]
    pub cv: f32,
    /// Radius of the star. No kernel reads it: the geometry is a constant
    /// flat-space metric, so it only reaches the diagnostic print and the
    /// parameter encoding compared between processes.
    #[serde(rename = "R")]
    pub r_star: f32,
    pub alpha: f32,
    pub beta: [f32; 3],
    pub gamma_down: [f32; 9],
    /// Pressure of the gas when a shallow water column is expanded into 3D.
    pub p_const: f32,
    pub periodic: bool,
    pub burning: bool,
    pub dprint: usize,
    pub print_levels: Vec<usize>,
    #[serde(default)]
    pub outfile: Option<PathBuf>,
}




// ============================================================================
impl SeaParams {

    /**
     * Read parameters from a file.
     */
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /**
     * Parse parameters from the text of a parameter file. The result is not
     * yet validated; see `validate`.
     */
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Entries::parse(text)?;
        entries.canonicalize_models()?;

        let fields = entries.lines.iter().map(|(name, tokens)| (name.as_str(), Value { name, tokens }));
        let map: MapDeserializer<'_, _, ValidationError> = MapDeserializer::new(fields);
        Ok(Self::deserialize(map)?)
    }

    /**
     * Check the scalar parameters. Per-level consistency (vertical
     * resolution, nesting, windows) is checked when the hierarchy is built.
     */
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        use ValidationError::LengthMismatch;

        let require = |ok: bool, field: &str, reason: &str| {
            if ok {
                Ok(())
            } else {
                Err(ValidationError::invalid(field, reason))
            }
        };
        require(self.nx >= 1, "nx", "must be at least 1")?;
        require(self.ny >= 1, "ny", "must be at least 1")?;
        require(self.ng >= 1, "ng", "must be at least 1")?;
        require(self.r > 1, "r", "refinement ratio must exceed 1")?;
        require(self.df > 0.0 && self.df <= 1.0, "df", "must lie in (0, 1]")?;
        require(self.nlevels >= 1, "nlevels", "must be at least 1")?;
        require(self.dprint >= 1, "dprint", "must be at least 1")?;

        if self.models.len() != self.nlevels {
            return Err(LengthMismatch { field: "models".into(), expected: self.nlevels, actual: self.models.len() });
        }
        if self.nzs.len() != self.nlevels {
            return Err(LengthMismatch { field: "nzs".into(), expected: self.nlevels, actual: self.nzs.len() });
        }
        require(self.xmax > self.xmin, "xmax", "must exceed xmin")?;
        require(self.ymax > self.ymin, "ymax", "must exceed ymin")?;
        require(self.zmax > self.zmin, "zmax", "must exceed zmin")?;
        require(!self.rho.is_empty(), "rho", "at least one layer density is required")?;
        require(self.rho.iter().all(|&r| r > 0.0 && r.is_finite()), "rho", "densities must be positive")?;
        require(self.q >= 0.0, "Q", "must be non-negative")?;
        require(self.gamma > 1.0, "gamma", "adiabatic index must exceed 1")?;
        require(self.e_he >= 0.0, "E_He", "must be non-negative")?;
        require(self.cv > 0.0, "Cv", "must be positive")?;
        require(self.r_star > 0.0, "R", "must be positive")?;
        require(self.p_const > 0.0, "p_const", "must be positive")?;

        if let Some(&level) = self.print_levels.iter().find(|&&l| l >= self.nlevels) {
            return Err(ValidationError::invalid("print_levels", format!("level {} does not exist", level)));
        }
        Ok(())
    }
}




/**
 * Parse the model tags of every level. Tags may be given one per token, or
 * as a single compact token of upper case letters (`SMC`).
 */
pub fn parse_models(tokens: &[String]) -> std::result::Result<Vec<Model>, ValidationError> {
    let compact = tokens.len() == 1
        && tokens[0].len() > 1
        && tokens[0].chars().all(|c| c.is_ascii_uppercase());

    let tags: Vec<String> = if compact {
        tokens[0].chars().map(String::from).collect()
    } else {
        tokens.to_vec()
    };
    tags.iter()
        .enumerate()
        .map(|(level, tag)| Model::from_tag(tag, level))
        .collect()
}




// ============================================================================
impl fmt::Display for SeaParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(items: &[T]) -> String {
            items.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(" ")
        }
        let models: Vec<_> = self.models.iter().map(|m| m.tag()).collect();

        writeln!(f, "nx {}", self.nx)?;
        writeln!(f, "ny {}", self.ny)?;
        writeln!(f, "nt {}", self.nt)?;
        writeln!(f, "ng {}", self.ng)?;
        writeln!(f, "r {}", self.r)?;
        writeln!(f, "df {}", self.df)?;
        writeln!(f, "nlevels {}", self.nlevels)?;
        writeln!(f, "models {}", list(&models))?;
        writeln!(f, "nzs {}", list(&self.nzs))?;
        writeln!(f, "xmin {}", self.xmin)?;
        writeln!(f, "xmax {}", self.xmax)?;
        writeln!(f, "ymin {}", self.ymin)?;
        writeln!(f, "ymax {}", self.ymax)?;
        writeln!(f, "zmin {}", self.zmin)?;
        writeln!(f, "zmax {}", self.zmax)?;
        writeln!(f, "rho {}", list(&self.rho))?;
        writeln!(f, "Q {}", self.q)?;
        writeln!(f, "gamma {}", self.gamma)?;
        writeln!(f, "E_He {}", self.e_he)?;
        writeln!(f, "Cv {}", self.cv)?;
        writeln!(f, "R {}", self.r_star)?;
        writeln!(f, "alpha {}", self.alpha)?;
        writeln!(f, "beta {}", list(&self.beta))?;
        writeln!(f, "gamma_down {}", list(&self.gamma_down))?;
        writeln!(f, "p_const {}", self.p_const)?;
        writeln!(f, "periodic {}", self.periodic)?;
        writeln!(f, "burning {}", self.burning)?;
        writeln!(f, "dprint {}", self.dprint)?;
        writeln!(f, "print_levels {}", list(&self.print_levels))?;

        if let Some(outfile) = &self.outfile {
            writeln!(f, "outfile {}", outfile.display())?;
        }
        Ok(())
    }
}




/**
 * The `name values...` lines of a parameter file, in file order.
 */
struct Entries {
    lines: Vec<(String, Vec<String>)>,
}




// ============================================================================
impl Entries {

    fn parse(text: &str) -> std::result::Result<Self, ValidationError> {
        let mut lines: Vec<(String, Vec<String>)> = Vec::new();

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("");
            let mut tokens = line.split_whitespace();

            if let Some(name) = tokens.next() {
                if lines.iter().any(|(n, _)| n == name) {
                    return Err(ValidationError::DuplicateField(name.into()));
                }
                lines.push((name.to_string(), tokens.map(String::from).collect()));
            }
        }
        Ok(Self { lines })
    }

    /**
     * Replace the model tags by the model names, so that the tags are checked
     * (and their levels reported) before anything else is read.
     */
    fn canonicalize_models(&mut self) -> std::result::Result<(), ValidationError> {
        if let Some((_, tokens)) = self.lines.iter_mut().find(|(name, _)| name == "models") {
            *tokens = parse_models(tokens)?.iter().map(|m| m.name().to_string()).collect();
        }
        Ok(())
    }
}




/**
 * The tokens following one field name. Scalars must be a single token;
 * sequences take every token, and fixed-size arrays exactly as many as
 * they have elements.
 */
#[derive(Clone, Copy)]
struct Value<'a> {
    name: &'a str,
    tokens: &'a [String],
}




// ============================================================================
impl<'a> Value<'a> {

    fn single(&self) -> std::result::Result<&'a str, ValidationError> {
        match self.tokens {
            [] => Err(ValidationError::invalid(self.name, "no value given")),
            [token] => Ok(token.as_str()),
            _ => Err(ValidationError::LengthMismatch { field: self.name.into(), expected: 1, actual: self.tokens.len() }),
        }
    }

    fn parse<T: std::str::FromStr>(&self) -> std::result::Result<T, ValidationError> {
        let token = self.single()?;
        token
            .parse()
            .map_err(|_| ValidationError::invalid(self.name, format!("could not parse '{}'", token)))
    }

    fn parse_bool(&self) -> std::result::Result<bool, ValidationError> {
        let token = self.single()?;

        match token.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" => Ok(true),
            "0" | "f" | "false" | "no" => Ok(false),
            _ => Err(ValidationError::invalid(self.name, format!("'{}' is not a boolean", token))),
        }
    }

    fn elements(&self) -> SeqDeserializer<impl Iterator<Item = Value<'a>>, ValidationError> {
        let (name, tokens) = (self.name, self.tokens);
        SeqDeserializer::new(tokens.iter().map(move |token| Value { name, tokens: std::slice::from_ref(token) }))
    }
}

macro_rules! parse_number {
    ($($method:ident => $visit:ident),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
                visitor.$visit(self.parse()?)
            }
        )*
    };
}

impl<'de, 'a> Deserializer<'de> for Value<'a> {
    type Error = ValidationError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_str(self.single()?)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_bool(self.parse_bool()?)
    }

    parse_number! {
        deserialize_i8 => visit_i8,
        deserialize_i16 => visit_i16,
        deserialize_i32 => visit_i32,
        deserialize_i64 => visit_i64,
        deserialize_u8 => visit_u8,
        deserialize_u16 => visit_u16,
        deserialize_u32 => visit_u32,
        deserialize_u64 => visit_u64,
        deserialize_f32 => visit_f32,
        deserialize_f64 => visit_f64,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        if self.tokens.is_empty() {
            return Err(ValidationError::invalid(self.name, "no value given"))
        }
        let mut elements = self.elements();
        let value = visitor.visit_seq(&mut elements)?;
        elements.end()?;
        Ok(value)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        if self.tokens.len() != len {
            return Err(ValidationError::LengthMismatch { field: self.name.into(), expected: len, actual: self.tokens.len() })
        }
        self.deserialize_seq(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V) -> std::result::Result<V::Value, Self::Error>
    {
        visitor.visit_enum(self.single()?.into_deserializer())
    }

    serde::forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct newtype_struct
        tuple_struct map struct identifier ignored_any
    }
}

impl<'de, 'a> IntoDeserializer<'de, ValidationError> for Value<'a> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl de::Error for ValidationError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ValidationError::invalid("parameters", msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        ValidationError::MissingField(field.into())
    }

    fn unknown_field(field: &str, _expected: &'static [&'static str]) -> Self {
        ValidationError::UnknownField(field.into())
    }

    fn duplicate_field(field: &'static str) -> Self {
        ValidationError::DuplicateField(field.into())
    }
}
