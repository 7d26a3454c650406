//! Typed view of the MeCab option string.

use std::fmt;
use std::str::FromStr;

use crate::constants::{
    MECAB_ALLOCATE_SENTENCE, MECAB_ALL_MORPHS, MECAB_MARGINAL_PROB, MECAB_NBEST, MECAB_NBEST_MAX,
    MECAB_ONE_BEST, MECAB_PARTIAL,
};
use crate::error::{MecabError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Flag,
    Value,
}

struct OptionSpec {
    short: char,
    long: &'static str,
    arity: Arity,
}

const OPTION_SPECS: &[OptionSpec] = &[
    OptionSpec { short: 'd', long: "dicdir", arity: Arity::Value },
    OptionSpec { short: 'u', long: "userdic", arity: Arity::Value },
    OptionSpec { short: 'l', long: "lattice-level", arity: Arity::Value },
    OptionSpec { short: 'O', long: "output-format-type", arity: Arity::Value },
    OptionSpec { short: 'a', long: "all-morphs", arity: Arity::Flag },
    OptionSpec { short: 'N', long: "nbest", arity: Arity::Value },
    OptionSpec { short: 'p', long: "partial", arity: Arity::Flag },
    OptionSpec { short: 'm', long: "marginal", arity: Arity::Flag },
    OptionSpec { short: 'M', long: "max-grouping-size", arity: Arity::Value },
    OptionSpec { short: 'F', long: "node-format", arity: Arity::Value },
    OptionSpec { short: 'U', long: "unk-format", arity: Arity::Value },
    OptionSpec { short: 'B', long: "bos-format", arity: Arity::Value },
    OptionSpec { short: 'E', long: "eos-format", arity: Arity::Value },
    OptionSpec { short: 'S', long: "eon-format", arity: Arity::Value },
    OptionSpec { short: 'x', long: "unk-feature", arity: Arity::Value },
    OptionSpec { short: 'b', long: "input-buffer-size", arity: Arity::Value },
    OptionSpec { short: 'C', long: "allocate-sentence", arity: Arity::Flag },
    OptionSpec { short: 't', long: "theta", arity: Arity::Value },
    OptionSpec { short: 'c', long: "cost-factor", arity: Arity::Value },
];

fn spec_for_short(short: char) -> Option<&'static OptionSpec> {
    OPTION_SPECS.iter().find(|spec| spec.short == short)
}

fn spec_for_long(long: &str) -> Option<&'static OptionSpec> {
    OPTION_SPECS.iter().find(|spec| spec.long == long)
}

/// Options used when opening a MeCab session.
///
/// Parse from the engine's command-line grammar with [`MecabOptions::parse`]
/// or build with the `with_*` methods. Both paths produce the same long-form
/// argument vector for the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MecabOptions {
    /// System dictionary directory.
    pub dicdir: Option<String>,
    /// User dictionary file.
    pub userdic: Option<String>,
    /// Lattice information level (deprecated by the engine).
    pub lattice_level: Option<i32>,
    /// Output format type such as `wakati`, `chasen` or `yomi`.
    pub output_format_type: Option<String>,
    /// Output all morphemes.
    pub all_morphs: bool,
    /// Number of best results for N-best output.
    pub nbest: Option<usize>,
    /// Partial parsing mode.
    pub partial: bool,
    /// Compute marginal probabilities.
    pub marginal: bool,
    /// Maximum grouping size for unknown words.
    pub max_grouping_size: Option<i32>,
    /// User-defined node format.
    pub node_format: Option<String>,
    /// User-defined unknown-node format.
    pub unk_format: Option<String>,
    /// User-defined beginning-of-sentence format.
    pub bos_format: Option<String>,
    /// User-defined end-of-sentence format.
    pub eos_format: Option<String>,
    /// User-defined end-of-N-best format.
    pub eon_format: Option<String>,
    /// Feature string used for unknown words.
    pub unk_feature: Option<String>,
    /// Input buffer size.
    pub input_buffer_size: Option<i32>,
    /// Let the engine copy the input sentence.
    pub allocate_sentence: bool,
    /// Temperature parameter theta.
    pub theta: Option<f64>,
    /// Cost factor.
    pub cost_factor: Option<i32>,
}

impl MecabOptions {
    /// Parses a command-line style option string.
    ///
    /// Quoted segments are preserved; short (`-F%m`, `-F %m`) and long
    /// (`--node-format=%m`, `--node-format %m`) forms are accepted.
    ///
    /// ```
    /// use mecab_rs::MecabOptions;
    ///
    /// let options = MecabOptions::parse("-N2 --node-format='%m\\t%f[0]\\n'").unwrap();
    /// assert_eq!(options.nbest, Some(2));
    /// assert_eq!(options.node_format.as_deref(), Some("%m\\t%f[0]\\n"));
    /// ```
    pub fn parse(options: &str) -> Result<Self> {
        let tokens = shell_words::split(options).map_err(|error| {
            MecabError::InvalidOptions(format!("cannot tokenize {options:?}: {error}"))
        })?;

        let mut parsed = Self::default();
        let mut index = 0;
        while index < tokens.len() {
            let token = &tokens[index];
            index += 1;

            if let Some(body) = token.strip_prefix("--") {
                let (name, inline_value) = match body.split_once('=') {
                    Some((name, value)) => (name, Some(value.to_string())),
                    None => (body, None),
                };
                let spec = spec_for_long(name).ok_or_else(|| {
                    MecabError::InvalidOptions(format!("unrecognized option --{name}"))
                })?;
                match (spec.arity, inline_value) {
                    (Arity::Flag, None) => parsed.apply(spec, None)?,
                    (Arity::Flag, Some(_)) => {
                        return Err(MecabError::InvalidOptions(format!(
                            "option --{name} does not take a value"
                        )))
                    }
                    (Arity::Value, Some(value)) => parsed.apply(spec, Some(value))?,
                    (Arity::Value, None) => {
                        let value = tokens.get(index).cloned().ok_or_else(|| {
                            MecabError::InvalidOptions(format!("option --{name} expects a value"))
                        })?;
                        index += 1;
                        parsed.apply(spec, Some(value))?;
                    }
                }
                continue;
            }

            let Some(cluster) = token.strip_prefix('-').filter(|rest| !rest.is_empty()) else {
                return Err(MecabError::InvalidOptions(format!(
                    "unexpected argument {token:?}"
                )));
            };

            // Short flags may be clustered (`-ap`); a value option ends the cluster.
            for (offset, short) in cluster.char_indices() {
                let spec = spec_for_short(short).ok_or_else(|| {
                    MecabError::InvalidOptions(format!("unrecognized option -{short}"))
                })?;
                if spec.arity == Arity::Flag {
                    parsed.apply(spec, None)?;
                    continue;
                }
                let rest = &cluster[offset + short.len_utf8()..];
                let value = if rest.is_empty() {
                    let value = tokens.get(index).cloned().ok_or_else(|| {
                        MecabError::InvalidOptions(format!("option -{short} expects a value"))
                    })?;
                    index += 1;
                    value
                } else {
                    rest.to_string()
                };
                parsed.apply(spec, Some(value))?;
                break;
            }
        }

        parsed.validate()?;
        Ok(parsed)
    }

    fn apply(&mut self, spec: &OptionSpec, value: Option<String>) -> Result<()> {
        let value = value.unwrap_or_default();
        match spec.long {
            "dicdir" => self.dicdir = Some(value),
            "userdic" => self.userdic = Some(value),
            "lattice-level" => self.lattice_level = Some(parse_number(spec, &value)?),
            "output-format-type" => self.output_format_type = Some(value),
            "all-morphs" => self.all_morphs = true,
            "nbest" => self.nbest = Some(parse_number(spec, &value)?),
            "partial" => self.partial = true,
            "marginal" => self.marginal = true,
            "max-grouping-size" => self.max_grouping_size = Some(parse_number(spec, &value)?),
            "node-format" => self.node_format = Some(value),
            "unk-format" => self.unk_format = Some(value),
            "bos-format" => self.bos_format = Some(value),
            "eos-format" => self.eos_format = Some(value),
            "eon-format" => self.eon_format = Some(value),
            "unk-feature" => self.unk_feature = Some(value),
            "input-buffer-size" => self.input_buffer_size = Some(parse_number(spec, &value)?),
            "allocate-sentence" => self.allocate_sentence = true,
            "theta" => self.theta = Some(parse_number(spec, &value)?),
            "cost-factor" => self.cost_factor = Some(parse_number(spec, &value)?),
            other => {
                return Err(MecabError::InvalidOptions(format!(
                    "unhandled option --{other}"
                )))
            }
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(nbest) = self.nbest {
            if nbest == 0 || nbest > MECAB_NBEST_MAX {
                return Err(MecabError::InvalidOptions(format!(
                    "--nbest must be within 1..={MECAB_NBEST_MAX}, got {nbest}"
                )));
            }
        }
        Ok(())
    }

    /// Long-form argument vector passed to the engine (without `argv[0]`).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push_value = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                args.push(format!("--{name}={value}"));
            }
        };
        push_value("dicdir", self.dicdir.clone());
        push_value("userdic", self.userdic.clone());
        push_value("lattice-level", self.lattice_level.map(|v| v.to_string()));
        push_value("output-format-type", self.output_format_type.clone());
        push_value("nbest", self.nbest.map(|v| v.to_string()));
        push_value("max-grouping-size", self.max_grouping_size.map(|v| v.to_string()));
        push_value("node-format", self.node_format.clone());
        push_value("unk-format", self.unk_format.clone());
        push_value("bos-format", self.bos_format.clone());
        push_value("eos-format", self.eos_format.clone());
        push_value("eon-format", self.eon_format.clone());
        push_value("unk-feature", self.unk_feature.clone());
        push_value("input-buffer-size", self.input_buffer_size.map(|v| v.to_string()));
        push_value("theta", self.theta.map(|v| v.to_string()));
        push_value("cost-factor", self.cost_factor.map(|v| v.to_string()));

        for (enabled, name) in [
            (self.all_morphs, "all-morphs"),
            (self.partial, "partial"),
            (self.marginal, "marginal"),
            (self.allocate_sentence, "allocate-sentence"),
        ] {
            if enabled {
                args.push(format!("--{name}"));
            }
        }
        args
    }

    /// Lattice request type the engine derives from these options.
    pub(crate) fn request_type(&self) -> i32 {
        let mut request_type = MECAB_ONE_BEST;
        if self.allocate_sentence {
            request_type |= MECAB_ALLOCATE_SENTENCE;
        }
        if self.partial {
            request_type |= MECAB_PARTIAL;
        }
        if self.all_morphs {
            request_type |= MECAB_ALL_MORPHS;
        }
        if self.marginal {
            request_type |= MECAB_MARGINAL_PROB;
        }
        if self.nbest.unwrap_or(1) >= 2 {
            request_type |= MECAB_NBEST;
        }
        match self.lattice_level.unwrap_or(0) {
            level if level >= 2 => request_type |= MECAB_NBEST | MECAB_MARGINAL_PROB,
            1 => request_type |= MECAB_NBEST,
            _ => {}
        }
        request_type
    }

    /// Returns whether node features come from the engine's node formatter.
    pub fn formats_node_feature(&self) -> bool {
        self.node_format.is_some() || self.output_format_type.is_some()
    }

    /// Sets the system dictionary directory.
    pub fn with_dicdir(mut self, dicdir: impl Into<String>) -> Self {
        self.dicdir = Some(dicdir.into());
        self
    }

    /// Sets the user dictionary file.
    pub fn with_userdic(mut self, userdic: impl Into<String>) -> Self {
        self.userdic = Some(userdic.into());
        self
    }

    /// Sets the output format type.
    pub fn with_output_format_type(mut self, format_type: impl Into<String>) -> Self {
        self.output_format_type = Some(format_type.into());
        self
    }

    /// Sets the number of N-best results.
    pub fn with_nbest(mut self, nbest: usize) -> Self {
        self.nbest = Some(nbest);
        self
    }

    /// Enables partial parsing mode.
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Enables marginal probabilities.
    pub fn with_marginal(mut self, marginal: bool) -> Self {
        self.marginal = marginal;
        self
    }

    /// Enables output of all morphemes.
    pub fn with_all_morphs(mut self, all_morphs: bool) -> Self {
        self.all_morphs = all_morphs;
        self
    }

    /// Sets the node format.
    pub fn with_node_format(mut self, node_format: impl Into<String>) -> Self {
        self.node_format = Some(node_format.into());
        self
    }

    /// Sets the unknown-node format.
    pub fn with_unk_format(mut self, unk_format: impl Into<String>) -> Self {
        self.unk_format = Some(unk_format.into());
        self
    }

    /// Sets the end-of-sentence format.
    pub fn with_eos_format(mut self, eos_format: impl Into<String>) -> Self {
        self.eos_format = Some(eos_format.into());
        self
    }

    /// Sets the unknown-word feature.
    pub fn with_unk_feature(mut self, unk_feature: impl Into<String>) -> Self {
        self.unk_feature = Some(unk_feature.into());
        self
    }

    /// Sets theta.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = Some(theta);
        self
    }

    /// Sets the cost factor.
    pub fn with_cost_factor(mut self, cost_factor: i32) -> Self {
        self.cost_factor = Some(cost_factor);
        self
    }
}

fn parse_number<T: FromStr>(spec: &OptionSpec, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        MecabError::InvalidOptions(format!(
            "--{} expects a number, got {value:?}",
            spec.long
        ))
    })
}

impl FromStr for MecabOptions {
    type Err = MecabError;

    fn from_str(options: &str) -> Result<Self> {
        Self::parse(options)
    }
}

impl fmt::Display for MecabOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(self.to_args()))
    }
}
