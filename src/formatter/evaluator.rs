use std::collections::HashMap;
use tracing::{debug, trace, warn};

use super::functions::{builtin, with_head, FunctionError, TemplateFunction};
use super::parser::{parse, Block, Expr, Node};
use super::value::{Value, DEFAULT_DATE_FORMAT, DEFAULT_LIST_SEPARATOR};
use crate::config::TemplateSettings;
use crate::construct::OtherHasher;
use crate::error::{CatalogError, Result};

/// Supplies variable values by lower-cased name. The specifier is whatever
/// followed `#` in the template, and its meaning is up to the resolver.
pub trait VarResolver {
    fn resolve(&self, name: &str, specifier: Option<&str>) -> Option<Value>;
}

impl<F> VarResolver for F
where
    F: Fn(&str, Option<&str>) -> Option<Value>,
{
    fn resolve(&self, name: &str, specifier: Option<&str>) -> Option<Value> {
        self(name, specifier)
    }
}

/// True when the template lexes and parses.
pub fn is_valid_template(template: &str) -> bool {
    parse(template).is_ok()
}

fn split_specifier(identifier: &str) -> (String, Option<&str>) {
    match identifier.split_once('#') {
        Some((name, specifier)) => (name.to_lowercase(), Some(specifier)),
        None => (identifier.to_lowercase(), None),
    }
}

// ------------- Evaluator -------------
pub struct Evaluator<'a> {
    resolvers: Vec<Box<dyn VarResolver + 'a>>,
    functions: HashMap<String, Box<dyn TemplateFunction + 'a>, OtherHasher>,
    strict: bool,
    list_separator: String,
    date_format: String,
}

/// The variable a block started from, used to give function errors context.
struct Chain {
    variable: Option<String>,
}

impl<'a> Evaluator<'a> {
    pub fn new<R: VarResolver + 'a>(primary: R, strict: bool) -> Self {
        Self {
            resolvers: vec![Box::new(primary)],
            functions: HashMap::default(),
            strict,
            list_separator: DEFAULT_LIST_SEPARATOR.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    pub fn with_settings<R: VarResolver + 'a>(primary: R, settings: &TemplateSettings) -> Self {
        let mut evaluator = Self::new(primary, settings.strict);
        evaluator.list_separator = settings.list_separator.clone();
        evaluator.date_format = settings.date_format.clone();
        evaluator
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Resolvers are consulted in the order they were added, after the primary.
    pub fn add_var_resolver<R: VarResolver + 'a>(&mut self, resolver: R) -> &mut Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Registered functions shadow built-ins of the same name.
    pub fn add_func_resolver<F: TemplateFunction + 'a>(&mut self, name: &str, function: F) -> &mut Self {
        self.functions.insert(name.to_lowercase(), Box::new(function));
        self
    }

    pub fn process(&self, template: &str) -> Result<String> {
        let nodes = parse(template).inspect_err(|e| warn!(error = %e, "Rejected template"))?;
        let mut output = String::with_capacity(template.len());
        for node in &nodes {
            match node {
                Node::Raw(text) => output.push_str(text),
                Node::Block(block) => {
                    let value = self
                        .block(block)
                        .inspect_err(|e| warn!(error = %e, block = %node, "Template evaluation failed"))?;
                    output.push_str(&value.render(&self.list_separator, &self.date_format));
                }
            }
        }
        debug!(template, output = %output, "Processed template");
        Ok(output)
    }

    fn block(&self, block: &Block) -> Result<Value> {
        let Some((first, filters)) = block.chain.split_first() else {
            return Ok(Value::Null);
        };
        let mut chain = Chain { variable: None };
        let mut value = self.head(first, &mut chain)?;
        if block.optional && value.is_empty() {
            trace!(block = ?block, "Skipped optional block");
            return Ok(Value::Null);
        }
        for filter in filters {
            value = self.filter(filter, value, &chain)?;
        }
        Ok(value)
    }

    fn head(&self, expr: &Expr, chain: &mut Chain) -> Result<Value> {
        match expr {
            Expr::FunctionOrVariable(identifier) => {
                if let Some(value) = self.variable(identifier) {
                    chain.variable = Some(identifier.clone());
                    return Ok(value);
                }
                if let Some(result) = self.call(identifier, None, &[], chain) {
                    return result;
                }
                self.unresolved(identifier)
            }
            other => self.argument(other, chain),
        }
    }

    fn filter(&self, expr: &Expr, head: Value, chain: &Chain) -> Result<Value> {
        match expr {
            Expr::Function { name, args } => {
                let args = self.arguments(args, chain)?;
                self.call(name, Some(&head), &args, chain)
                    .unwrap_or_else(|| Err(CatalogError::UnknownFunction { name: name.clone() }))
            }
            Expr::FunctionOrVariable(identifier) => {
                if let Some(result) = self.call(identifier, Some(&head), &[], chain) {
                    return result;
                }
                self.variable(identifier).ok_or_else(|| CatalogError::UnknownFunction {
                    name: identifier.clone(),
                })
            }
            Expr::String(text) => Ok(Value::String(text.clone())),
            Expr::Number(n) => Ok(Value::from(*n)),
        }
    }

    /// Arguments and head literals: no value flows in.
    fn argument(&self, expr: &Expr, chain: &Chain) -> Result<Value> {
        match expr {
            Expr::String(text) => Ok(Value::String(text.clone())),
            Expr::Number(n) => Ok(Value::from(*n)),
            Expr::Function { name, args } => {
                let args = self.arguments(args, chain)?;
                self.call(name, None, &args, chain)
                    .unwrap_or_else(|| Err(CatalogError::UnknownFunction { name: name.clone() }))
            }
            Expr::FunctionOrVariable(identifier) => match self.variable(identifier) {
                Some(value) => Ok(value),
                None => match self.call(identifier, None, &[], chain) {
                    Some(result) => result,
                    None => self.unresolved(identifier),
                },
            },
        }
    }

    fn arguments(&self, exprs: &[Expr], chain: &Chain) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.argument(e, chain)).collect()
    }

    fn variable(&self, identifier: &str) -> Option<Value> {
        let (name, specifier) = split_specifier(identifier);
        self.resolvers
            .iter()
            .find_map(|r| r.resolve(&name, specifier).filter(|v| *v != Value::Null))
    }

    fn unresolved(&self, identifier: &str) -> Result<Value> {
        if self.strict {
            Err(CatalogError::UnresolvedVariable {
                name: identifier.to_string(),
            })
        } else {
            trace!(variable = identifier, "Unresolved variable rendered empty");
            Ok(Value::Null)
        }
    }

    /// `None` when no function has the name.
    fn call(&self, name: &str, head: Option<&Value>, args: &[Value], chain: &Chain) -> Option<Result<Value>> {
        let key = name.to_lowercase();
        let result: std::result::Result<Value, FunctionError> = match self.functions.get(&key) {
            Some(function) => function.call(head, args),
            None => {
                let function = builtin(&key)?;
                function(&with_head(head, args))
            }
        };
        Some(result.map_err(|source| CatalogError::Evaluation {
            function: key,
            variable: chain.variable.clone(),
            source,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::functions::FunctionResult;

    fn books(name: &str, specifier: Option<&str>) -> Option<Value> {
        match (name, specifier) {
            ("title", _) => Some("The Gunslinger".into()),
            ("empty", _) => Some("".into()),
            ("series_index", _) => Some(Value::Number(1.0)),
            ("authors", Some(index)) => {
                let authors = ["Stephen King", "Peter Straub"];
                index.parse::<usize>().ok().and_then(|i| authors.get(i)).map(|&a| a.into())
            }
            ("authors", None) => Some(vec!["Stephen King", "Peter Straub"].into()),
            _ => None,
        }
    }

    #[test]
    fn resolves_case_insensitively_with_specifiers() {
        let evaluator = Evaluator::new(books, false);
        assert_eq!(evaluator.process("{TITLE}").unwrap(), "The Gunslinger");
        assert_eq!(evaluator.process("{authors#1}").unwrap(), "Peter Straub");
        assert_eq!(evaluator.process("{authors}").unwrap(), "Stephen King, Peter Straub");
    }

    #[test]
    fn later_resolvers_fill_gaps() {
        let mut evaluator = Evaluator::new(books, true);
        evaluator.add_var_resolver(|name: &str, _: Option<&str>| (name == "extra").then(|| Value::from("more")));
        assert_eq!(evaluator.process("{title}/{extra}").unwrap(), "The Gunslinger/more");
    }

    #[test]
    fn null_results_do_not_shadow_later_resolvers() {
        let blank = |name: &str, _: Option<&str>| (name == "x" || name == "y").then_some(Value::Null);
        let mut evaluator = Evaluator::new(blank, true);
        evaluator.add_var_resolver(|name: &str, _: Option<&str>| (name == "x").then(|| Value::from("from second")));
        assert_eq!(evaluator.process("{x}").unwrap(), "from second");
        assert!(matches!(
            evaluator.process("{y}"),
            Err(CatalogError::UnresolvedVariable { name }) if name == "y"
        ));
    }

    #[test]
    fn registered_functions_receive_the_head() {
        let mut evaluator = Evaluator::new(books, true);
        evaluator.add_func_resolver("Initial", |head: Option<&Value>, _: &[Value]| -> FunctionResult {
            let text = head.map(|v| v.to_string()).unwrap_or_default();
            Ok(Value::from(text.chars().next().map(String::from).unwrap_or_default()))
        });
        assert_eq!(evaluator.process("{title|initial}").unwrap(), "T");
        assert_eq!(evaluator.process("{initial()}").unwrap(), "");
    }

    #[test]
    fn zero_argument_function_in_head_position() {
        let evaluator = Evaluator::new(books, true);
        assert_eq!(evaluator.process("{_lorem|uppercase}").unwrap(), "LOREM IPSUM DOLOR SIT AMET CONSECTETUR ADIPISCING ELIT");
    }

    #[test]
    fn unknown_function_is_fatal() {
        let evaluator = Evaluator::new(books, false);
        assert!(matches!(
            evaluator.process("{title|shout}"),
            Err(CatalogError::UnknownFunction { name }) if name == "shout"
        ));
    }

    #[test]
    fn settings_control_rendering() {
        let settings = TemplateSettings {
            strict: true,
            list_separator: " & ".into(),
            date_format: "%Y".into(),
        };
        let evaluator = Evaluator::with_settings(books, &settings);
        assert!(evaluator.is_strict());
        assert_eq!(evaluator.process("{authors}").unwrap(), "Stephen King & Peter Straub");
        assert_eq!(evaluator.process("{utc(0)}").unwrap(), "1970");
    }
}
