//! Selection parsing
//!
//! Turns runner arguments such as `CLASScom.acme.Calc` and
//! `METHODtestAdd:com.acme.Calc` into the set of classes and methods to run.
//! Parsing is purely syntactic; whether a name exists is for the engine to find out.

use tracing::warn;

const CLASS_PREFIX: &str = "CLASS";
const METHOD_PREFIX: &str = "METHOD";

/// Which methods of a selected class to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    All,
    Only(Vec<String>),
}

impl MethodFilter {
    pub fn includes(&self, method: &str) -> bool {
        match self {
            MethodFilter::All => true,
            MethodFilter::Only(methods) => methods.iter().any(|m| m == method),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSelection {
    pub class: String,
    pub methods: MethodFilter,
}

/// Classes to run, in the order they were first named
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub classes: Vec<ClassSelection>,
}

impl Selection {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
        let mut selection = Selection::default();

        for arg in args {
            let arg = arg.as_ref();
            if let Some(class) = arg.strip_prefix(CLASS_PREFIX) {
                selection.add_class(class);
            } else if let Some(rest) = arg.strip_prefix(METHOD_PREFIX) {
                match rest.rsplit_once(':') {
                    Some((method, class)) => selection.add_method(class, method),
                    None => warn!("Ignoring method selection without a class: {}", arg),
                }
            } else {
                warn!("Ignoring unrecognized selection: {}", arg);
            }
        }

        selection
    }

    /// Select a whole class. Wins over any method selection for it.
    pub fn add_class(&mut self, class: &str) {
        if class.is_empty() {
            warn!("Ignoring empty class selection");
            return;
        }

        match self.classes.iter_mut().find(|c| c.class == class) {
            Some(existing) => existing.methods = MethodFilter::All,
            None => self.classes.push(ClassSelection {
                class: class.to_string(),
                methods: MethodFilter::All,
            }),
        }
    }

    /// Select one method, implicitly selecting its class as a container
    pub fn add_method(&mut self, class: &str, method: &str) {
        if class.is_empty() || method.is_empty() {
            warn!("Ignoring incomplete method selection {}:{}", method, class);
            return;
        }

        match self.classes.iter_mut().find(|c| c.class == class) {
            Some(existing) => {
                if let MethodFilter::Only(ref mut methods) = existing.methods {
                    if !methods.iter().any(|m| m == method) {
                        methods.push(method.to_string());
                    }
                }
            }
            None => self.classes.push(ClassSelection {
                class: class.to_string(),
                methods: MethodFilter::Only(vec![method.to_string()]),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }
}
