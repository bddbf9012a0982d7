//! Build-time side: picks candidate methods, translates them into stubs and
//! swaps their bodies for bootstraps.

pub mod bootstrap;
pub mod dump;
pub mod translate;

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use bootstrap::BootstrapPlan;
pub use dump::{Disassembler, format_method, format_table};
pub use translate::{TranslateError, Translation, translate};

use crate::config::VirtualizerConfig;
use crate::model::{ClassNode, MethodNode};
use crate::vm::{ClassDef, StubTable};

/// A method whose body now lives in the stub table.
#[derive(Debug, Clone)]
pub struct VirtualizedMethod {
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub plan: BootstrapPlan,
}

impl VirtualizedMethod {
    pub fn key(&self) -> String {
        format!("{}.{}{}", self.owner, self.name, self.desc)
    }

    /// Add this method to a host class, bodied by its bootstrap, so that
    /// reflective calls on the class run the stub.
    pub fn install(&self, class: ClassDef) -> ClassDef {
        let params: Vec<&str> = self.plan.params.iter().map(|p| p.name()).collect();
        let ret = self.plan.return_type.name();
        let plan = self.plan.clone();
        let body = move |inv: &crate::vm::Invocation<'_>| plan.invoke(inv.runtime, inv.this.clone(), &inv.args);
        if self.plan.is_static {
            class.static_method(&self.name, &params, ret, body)
        } else {
            class.method(&self.name, &params, ret, body)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMethod {
    pub method: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassReport {
    pub name: String,
    pub virtualized: Vec<String>,
    pub skipped: Vec<SkippedMethod>,
}

/// Per-class outcome of a virtualization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VirtualizeReport {
    pub classes: Vec<ClassReport>,
}

impl VirtualizeReport {
    pub fn virtualized_count(&self) -> usize {
        self.classes.iter().map(|c| c.virtualized.len()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.classes.iter().map(|c| c.skipped.len()).sum()
    }
}

impl fmt::Display for VirtualizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in &self.classes {
            writeln!(
                f,
                "{}: {} virtualized, {} skipped",
                class.name,
                class.virtualized.len(),
                class.skipped.len()
            )?;
            for method in &class.virtualized {
                writeln!(f, "  + {}", method)?;
            }
            for skipped in &class.skipped {
                writeln!(f, "  - {}: {}", skipped.method, skipped.reason)?;
            }
        }
        write!(
            f,
            "total: {} virtualized, {} skipped in {} classes",
            self.virtualized_count(),
            self.skipped_count(),
            self.classes.len()
        )
    }
}

pub struct Virtualizer {
    config: VirtualizerConfig,
    stubs: StubTable,
    names: Vec<String>,
    report: VirtualizeReport,
}

impl Virtualizer {
    pub fn new(config: VirtualizerConfig) -> Self {
        Self {
            config,
            stubs: StubTable::new(),
            names: Vec::new(),
            report: VirtualizeReport::default(),
        }
    }

    pub fn config(&self) -> &VirtualizerConfig {
        &self.config
    }

    /// Constructors, class initializers, abstract and native methods keep
    /// their bodies.
    pub fn is_candidate(method: &MethodNode) -> bool {
        !(method.is_constructor() || method.is_class_initializer() || method.is_abstract() || method.is_native())
    }

    /// Translate one method and replace its body. On error the method is
    /// left untouched and nothing is added to the stub table.
    pub fn virtualize_method(
        &mut self,
        owner: &str,
        method: &mut MethodNode,
    ) -> Result<VirtualizedMethod, TranslateError> {
        if !Self::is_candidate(method) {
            return Err(TranslateError::Unsupported(format!(
                "{}{} is not a virtualization candidate",
                method.name, method.desc
            )));
        }

        let translation = translate(method)?;
        let offset = self.stubs.len();
        let plan = BootstrapPlan::new(
            method,
            offset,
            translation.try_catches,
            self.config.stack_margin,
            self.config.locals_margin,
        )?;
        debug!(
            method = %format!("{}.{}{}", owner, method.name, method.desc),
            offset,
            instructions = translation.code.len(),
            "translated"
        );
        self.stubs.push(translation.code);
        plan.apply(method);

        let virtualized = VirtualizedMethod {
            owner: owner.to_string(),
            name: method.name.clone(),
            desc: method.desc.clone(),
            plan,
        };
        self.names.push(virtualized.key());
        Ok(virtualized)
    }

    /// Virtualize every candidate method of `class`. Methods that fail to
    /// translate are skipped and recorded in the report.
    pub fn virtualize_class(&mut self, class: &mut ClassNode) -> Vec<VirtualizedMethod> {
        let mut report = ClassReport {
            name: class.name.clone(),
            ..Default::default()
        };
        let mut done = Vec::new();

        for method in class.methods.iter_mut().filter(|m| Self::is_candidate(m)) {
            let signature = format!("{}{}", method.name, method.desc);
            match self.virtualize_method(&class.name, method) {
                Ok(virtualized) => {
                    report.virtualized.push(signature);
                    done.push(virtualized);
                }
                Err(err) => {
                    warn!(class = %class.name, method = %signature, error = %err, "skipping method");
                    report.skipped.push(SkippedMethod {
                        method: signature,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            class = %class.name,
            virtualized = report.virtualized.len(),
            skipped = report.skipped.len(),
            "class virtualized"
        );
        self.report.classes.push(report);
        done
    }

    pub fn stubs(&self) -> &StubTable {
        &self.stubs
    }

    /// Method keys by stub offset.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn report(&self) -> &VirtualizeReport {
        &self.report
    }

    pub fn finish(self) -> (StubTable, VirtualizeReport) {
        (self.stubs, self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::opcodes::*;
    use crate::model::{ACC_ABSTRACT, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC, Insn, LabelId};

    fn method(access: u16, name: &str, desc: &str, insns: Vec<Insn>) -> MethodNode {
        MethodNode {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            max_stack: 2,
            max_locals: 2,
            instructions: insns,
            try_catch_blocks: vec![],
        }
    }

    fn class() -> ClassNode {
        let switch = Insn::LookupSwitch {
            default: LabelId(0),
            keys: vec![1],
            labels: vec![LabelId(0)],
        };
        ClassNode {
            access: ACC_PUBLIC,
            name: "demo/Calc".to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: vec![],
            fields: vec![],
            methods: vec![
                method(ACC_PUBLIC, "<init>", "()V", vec![Insn::simple(RETURN)]),
                method(
                    ACC_STATIC,
                    "add",
                    "(II)I",
                    vec![
                        Insn::var(ILOAD, 0),
                        Insn::var(ILOAD, 1),
                        Insn::simple(IADD),
                        Insn::simple(IRETURN),
                    ],
                ),
                method(ACC_STATIC, "pick", "(I)I", vec![Insn::label(0), Insn::var(ILOAD, 0), switch]),
                method(ACC_PUBLIC | ACC_ABSTRACT, "shape", "()I", vec![]),
                method(ACC_PUBLIC | ACC_NATIVE, "hash", "()I", vec![]),
                method(ACC_STATIC, "zero", "()V", vec![Insn::simple(RETURN)]),
            ],
        }
    }

    #[test]
    fn test_candidates() {
        let class = class();
        let candidates: Vec<_> = class
            .methods
            .iter()
            .filter(|m| Virtualizer::is_candidate(m))
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(candidates, vec!["add", "pick", "zero"]);
    }

    #[test]
    fn test_virtualize_class() {
        let mut class = class();
        let original_pick = class.methods[2].clone();
        let mut virtualizer = Virtualizer::new(VirtualizerConfig::default());
        let done = virtualizer.virtualize_class(&mut class);

        assert_eq!(done.len(), 2);
        assert_eq!(done[0].key(), "demo/Calc.add(II)I");
        assert_eq!(done[0].plan.stub_offset, 0);
        assert_eq!(done[1].plan.stub_offset, 1);
        assert_eq!(virtualizer.names(), ["demo/Calc.add(II)I", "demo/Calc.zero()V"]);

        // Skipped methods are untouched and take no stub.
        assert_eq!(class.methods[2], original_pick);
        assert_eq!(virtualizer.stubs().len(), 2);
        assert_eq!(class.methods[0].instructions, vec![Insn::simple(RETURN)]);
        assert_ne!(class.methods[1].instructions.len(), 4);

        let (table, report) = virtualizer.finish();
        assert_eq!(table.len(), 2);
        assert_eq!(report.virtualized_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.classes[0].skipped[0].method, "pick(I)I");
        assert!(report.classes[0].skipped[0].reason.contains("lookupswitch"));

        let text = report.to_string();
        assert!(text.contains("demo/Calc: 2 virtualized, 1 skipped"));
        assert!(text.ends_with("total: 2 virtualized, 1 skipped in 1 classes"));
    }

    #[test]
    fn test_non_candidate_rejected() {
        let mut virtualizer = Virtualizer::new(VirtualizerConfig::default());
        let mut ctor = method(ACC_PUBLIC, "<init>", "()V", vec![Insn::simple(RETURN)]);
        assert!(virtualizer.virtualize_method("demo/A", &mut ctor).is_err());
        assert!(virtualizer.stubs().is_empty());
    }

    #[test]
    fn test_report_json() {
        let mut class = class();
        let mut virtualizer = Virtualizer::new(VirtualizerConfig::default());
        virtualizer.virtualize_class(&mut class);
        let json = serde_json::to_value(virtualizer.report()).unwrap();
        assert_eq!(json["classes"][0]["name"], "demo/Calc");
        assert_eq!(json["classes"][0]["virtualized"][1], "zero()V");
    }
}
