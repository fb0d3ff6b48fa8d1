//! Signature descriptors
//!
//! A [`FunctionDecl`] is what a caller declares: parameter names, their
//! (possibly missing) annotations and defaults, and the (possibly missing)
//! return annotation. [`Signature::from_decl`] validates it once, at
//! registration, into an immutable [`Signature`].

use crate::types::TypeDecl;
use crate::{Error, Result};
use rusqlite::types::Value;

/// A declared parameter, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub ty: Option<TypeDecl>,
    pub default: Option<Value>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, ty: TypeDecl) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            default: None,
        }
    }

    /// A parameter declared without a type annotation
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A declared function, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub returns: Option<TypeDecl>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeDecl) -> Self {
        self.params.push(ParamDecl::new(name, ty));
        self
    }

    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        ty: TypeDecl,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(ParamDecl::new(name, ty).with_default(default));
        self
    }

    pub fn push(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, ty: TypeDecl) -> Self {
        self.returns = Some(ty);
        self
    }
}

/// A validated parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeDecl,
    pub default: Option<Value>,
}

impl Parameter {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// How a function's result is laid out in its table
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnShape {
    /// One column named `return`
    Scalar(TypeDecl),
    /// Columns `return_0 .. return_{n-1}`
    Tuple(Vec<TypeDecl>),
}

impl ReturnShape {
    /// Number of stored return columns
    pub fn arity(&self) -> usize {
        match self {
            ReturnShape::Scalar(_) => 1,
            ReturnShape::Tuple(types) => types.len(),
        }
    }

    /// Return column names, in table order
    pub fn column_names(&self) -> Vec<String> {
        match self {
            ReturnShape::Scalar(_) => vec!["return".to_string()],
            ReturnShape::Tuple(types) => (0..types.len()).map(|i| format!("return_{}", i)).collect(),
        }
    }

    /// Declared type of each return column
    pub fn types(&self) -> Vec<&TypeDecl> {
        match self {
            ReturnShape::Scalar(ty) => vec![ty],
            ReturnShape::Tuple(types) => types.iter().collect(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ReturnShape::Scalar(_) => "scalar".to_string(),
            ReturnShape::Tuple(types) => format!("{}-tuple", types.len()),
        }
    }
}

/// The cacheable shape of a function: its name, ordered parameters and
/// return shape. Built once per registration and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_shape: ReturnShape,
}

impl Signature {
    /// Validate a declaration.
    ///
    /// Every parameter and the return must be annotated. A tuple return
    /// becomes [`ReturnShape::Tuple`]; anything else, including an optional
    /// tuple, is a scalar.
    pub fn from_decl(decl: FunctionDecl) -> Result<Self> {
        check_name(&decl.name)?;

        let mut parameters: Vec<Parameter> = Vec::with_capacity(decl.params.len());
        for param in decl.params {
            check_name(&param.name)?;
            if parameters.iter().any(|p| same_column(&p.name, &param.name)) {
                return Err(Error::DuplicateParameter {
                    function: decl.name,
                    param: param.name,
                });
            }
            let ty = param.ty.ok_or_else(|| Error::MissingParameterType(param.name.clone()))?;
            if param.default.is_none() && parameters.last().is_some_and(Parameter::has_default) {
                return Err(Error::NonDefaultAfterDefault {
                    function: decl.name,
                    param: param.name,
                });
            }
            parameters.push(Parameter {
                name: param.name,
                ty,
                default: param.default,
            });
        }

        let return_shape = match decl.returns {
            None => return Err(Error::MissingReturnType(decl.name)),
            Some(TypeDecl::Tuple(types)) if types.is_empty() => {
                return Err(Error::UntypedTuple(decl.name));
            }
            Some(TypeDecl::Tuple(types)) => ReturnShape::Tuple(types),
            Some(ty) => ReturnShape::Scalar(ty),
        };

        let reserved = return_shape.column_names();
        if let Some(clash) = parameters
            .iter()
            .find(|p| reserved.iter().any(|r| same_column(r, &p.name)))
        {
            return Err(Error::DuplicateParameter {
                function: decl.name,
                param: clash.name.clone(),
            });
        }

        Ok(Self {
            name: decl.name,
            parameters,
            return_shape,
        })
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    /// Bind positional arguments, filling omitted trailing ones from their
    /// defaults. The result has exactly one value per parameter.
    pub fn bind(&self, args: &[Value]) -> Result<Vec<Value>> {
        if args.len() > self.parameters.len() {
            return Err(Error::Binding {
                function: self.name.clone(),
                reason: format!(
                    "takes {} positional arguments but {} were given",
                    self.parameters.len(),
                    args.len()
                ),
            });
        }

        let mut values = args.to_vec();
        for param in &self.parameters[args.len()..] {
            match &param.default {
                Some(default) => values.push(default.clone()),
                None => {
                    return Err(Error::Binding {
                        function: self.name.clone(),
                        reason: format!("missing required argument '{}'", param.name),
                    });
                }
            }
        }
        Ok(values)
    }
}

impl std::fmt::Display for Signature {
    /// `get_image(card: str, size: str = "small") -> str`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| match &p.default {
                Some(default) => format!("{}: {} = {}", p.name, p.ty, literal(default)),
                None => format!("{}: {}", p.name, p.ty),
            })
            .collect();
        let returns = match &self.return_shape {
            ReturnShape::Scalar(ty) => ty.to_string(),
            ReturnShape::Tuple(types) => TypeDecl::Tuple(types.clone()).to_string(),
        };
        write!(f, "{}({}) -> {}", self.name, params.join(", "), returns)
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => format!("{:?}", r),
        Value::Text(s) => format!("{:?}", s),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// SQLite compares identifiers ASCII case-insensitively
fn same_column(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}
