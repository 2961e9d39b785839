//! JUnit5-style engine
//!
//! Selectors are first discovered into a [`TestPlan`] of containers and tests
//! addressed by unique ids such as
//! `[engine:junit-jupiter]/[class:com.acme.Calc]/[method:testAdd()]`,
//! then the plan is executed. Data tables become parameterized containers
//! with one invocation per row; nested classes become nested containers.

use anyhow::Result;
use std::time::Instant;
use tracing::{debug, warn};

use super::elapsed_ms;
use crate::catalog::{class_node, method_node, Failure, TestCatalog, TestClass, TestMethod, TestOutcome};
use crate::selection::{MethodFilter, Selection};
use crate::test_model::{TestKind, TestLevel, TestNode};

pub const ENGINE_ID: &str = "[engine:junit-jupiter]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySelector {
    Class(String),
    Method { class: String, method: String },
}

#[derive(Debug, Clone, Default)]
pub struct LauncherDiscoveryRequest {
    pub selectors: Vec<DiscoverySelector>,
}

impl LauncherDiscoveryRequest {
    pub fn from_selection(selection: &Selection) -> Self {
        let mut selectors = Vec::new();
        for class in &selection.classes {
            match class.methods {
                MethodFilter::All => selectors.push(DiscoverySelector::Class(class.class.clone())),
                MethodFilter::Only(ref methods) => {
                    for method in methods {
                        selectors.push(DiscoverySelector::Method {
                            class: class.class.clone(),
                            method: method.clone(),
                        });
                    }
                }
            }
        }
        Self { selectors }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    Container,
    Test,
}

#[derive(Debug, Clone)]
pub struct TestIdentifier {
    pub unique_id: String,
    pub display_name: String,
    pub kind: TestType,
    pub parent_id: Option<String>,
    pub node: TestNode,
}

impl TestIdentifier {
    pub fn is_container(&self) -> bool {
        self.kind == TestType::Container
    }

    pub fn is_test(&self) -> bool {
        self.kind == TestType::Test
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Successful,
    Aborted,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TestExecutionResult {
    pub status: Status,
    pub failure: Option<Failure>,
    pub duration_ms: u64,
}

impl TestExecutionResult {
    fn successful(duration_ms: u64) -> Self {
        Self {
            status: Status::Successful,
            failure: None,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
enum Executable {
    Container,
    Invoke { method: TestMethod, args: Vec<String> },
    Skip(String),
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub identifier: TestIdentifier,
    pub children: Vec<PlanNode>,
    executable: Executable,
}

impl PlanNode {
    fn container(identifier: TestIdentifier) -> Self {
        Self {
            identifier,
            children: Vec::new(),
            executable: Executable::Container,
        }
    }

    fn push(&mut self, mut child: PlanNode) {
        child.identifier.parent_id = Some(self.identifier.unique_id.clone());
        self.children.push(child);
    }

    fn find(&self, unique_id: &str) -> Option<&PlanNode> {
        if self.identifier.unique_id == unique_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(unique_id))
    }

    fn test_count(&self) -> usize {
        match self.identifier.kind {
            TestType::Test => 1,
            TestType::Container => self.children.iter().map(|c| c.test_count()).sum(),
        }
    }
}

/// Result of discovery: the engine container and everything below it
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub engine: PlanNode,
}

impl TestPlan {
    pub fn get_children(&self, unique_id: &str) -> Vec<&TestIdentifier> {
        self.engine
            .find(unique_id)
            .map(|n| n.children.iter().map(|c| &c.identifier).collect())
            .unwrap_or_default()
    }

    pub fn contains_tests(&self) -> bool {
        self.count_tests() > 0
    }

    pub fn count_tests(&self) -> usize {
        self.engine.test_count()
    }

    pub fn is_engine(&self, identifier: &TestIdentifier) -> bool {
        identifier.unique_id == self.engine.identifier.unique_id
    }
}

/// Callbacks fired while a test plan executes
pub trait TestExecutionListener {
    fn test_plan_execution_started(&mut self, _plan: &TestPlan) -> Result<()> {
        Ok(())
    }

    /// Fired instead of started/finished; descendants are not reported
    fn execution_skipped(&mut self, _identifier: &TestIdentifier, _reason: &str) -> Result<()> {
        Ok(())
    }

    fn execution_started(&mut self, _identifier: &TestIdentifier) -> Result<()> {
        Ok(())
    }

    fn execution_finished(
        &mut self,
        _identifier: &TestIdentifier,
        _result: &TestExecutionResult,
    ) -> Result<()> {
        Ok(())
    }

    fn test_plan_execution_finished(&mut self, _plan: &TestPlan) -> Result<()> {
        Ok(())
    }
}

pub struct Launcher<'a> {
    catalog: &'a dyn TestCatalog,
}

impl<'a> Launcher<'a> {
    pub fn new(catalog: &'a dyn TestCatalog) -> Self {
        Self { catalog }
    }

    pub fn discover(&self, request: &LauncherDiscoveryRequest) -> TestPlan {
        let project = self.catalog.project();
        let engine_node = TestNode::suite("JUnit Jupiter", ENGINE_ID, project, TestKind::JUnit5);
        let mut engine = PlanNode::container(identifier(ENGINE_ID, "JUnit Jupiter", TestType::Container, engine_node));

        for selector in &request.selectors {
            let (class_name, method) = match selector {
                DiscoverySelector::Class(class) => (class.as_str(), None),
                DiscoverySelector::Method { class, method } => (class.as_str(), Some(method.as_str())),
            };
            let class_id = format!("{}/[class:{}]", ENGINE_ID, class_name);

            // method selectors of one class share its container
            let index = match engine.children.iter().position(|c| c.identifier.unique_id == class_id) {
                Some(index) => index,
                None => {
                    engine.push(self.discover_class(class_name, &class_id, method.is_none()));
                    engine.children.len() - 1
                }
            };
            let container = &mut engine.children[index];

            if let Some(method) = method {
                if !container.children.iter().any(|c| c.identifier.node.method_name() == Some(method)) {
                    let child = match self.catalog.load_class(class_name) {
                        Some(class) => match class.find_method(method) {
                            Some(found) => method_plan(found, class, class_name, &class_id, project),
                            None => {
                                warn!("Method not found: {}#{}", class_name, method);
                                missing_method(class_name, &class_id, method, project, "Method not found")
                            }
                        },
                        None => missing_method(class_name, &class_id, method, project, "Class not found"),
                    };
                    container.push(child);
                }
            }
        }

        debug!("Discovered {} test(s)", engine.test_count());
        TestPlan { engine }
    }

    /// Container for a class; methods and nested classes only when the whole class is selected.
    /// An unresolved class is a skipped container; when selected whole it
    /// holds one placeholder test named after the class.
    fn discover_class(&self, class_name: &str, class_id: &str, whole: bool) -> PlanNode {
        let project = self.catalog.project();

        match self.catalog.load_class(class_name) {
            Some(class) if whole => class_plan(class, class_name, class_id, project),
            Some(class) => {
                let node = class_node(Some(class), class_name, project, TestKind::JUnit5);
                PlanNode::container(identifier(class_id, &node.label.clone(), TestType::Container, node))
            }
            None => {
                warn!("Class not found: {}", class_name);
                let reason = format!("Class not found: {}", class_name);
                let node = class_node(None, class_name, project, TestKind::JUnit5);
                let label = node.label.clone();
                let mut container = PlanNode::container(identifier(class_id, &label, TestType::Container, node));
                container.executable = Executable::Skip(reason.clone());

                if whole {
                    let placeholder = TestNode::case(&label, &format!("{}#{}", class_name, label), project, TestKind::JUnit5);
                    container.push(PlanNode {
                        identifier: identifier(&format!("{}/[class-not-found]", class_id), &label, TestType::Test, placeholder),
                        children: Vec::new(),
                        executable: Executable::Skip(reason),
                    });
                }
                container
            }
        }
    }

    pub fn execute(&self, plan: &TestPlan, listener: &mut dyn TestExecutionListener) -> Result<()> {
        listener.test_plan_execution_started(plan)?;
        execute_node(&plan.engine, listener)?;
        listener.test_plan_execution_finished(plan)
    }
}

fn identifier(unique_id: &str, display_name: &str, kind: TestType, node: TestNode) -> TestIdentifier {
    TestIdentifier {
        unique_id: unique_id.to_string(),
        display_name: display_name.to_string(),
        kind,
        parent_id: None,
        node,
    }
}

fn class_plan(class: &TestClass, full_name: &str, class_id: &str, project: &str) -> PlanNode {
    let node = class_node(Some(class), full_name, project, TestKind::JUnit5);
    let mut container = PlanNode::container(identifier(class_id, &node.label.clone(), TestType::Container, node));

    for method in &class.methods {
        container.push(method_plan(method, class, full_name, class_id, project));
    }

    for nested in &class.nested {
        let nested_name = format!("{}${}", full_name, nested.name);
        let nested_id = format!("{}/[nested-class:{}]", class_id, nested.name);
        container.push(class_plan(nested, &nested_name, &nested_id, project));
    }

    container
}

fn method_plan(method: &TestMethod, class: &TestClass, class_name: &str, class_id: &str, project: &str) -> PlanNode {
    let display_name = format!("{}()", method.name);
    let source = class.source.as_deref();

    if let Some(ref reason) = method.disabled {
        let node = method_node(method, class_name, project, source, TestKind::JUnit5);
        let unique_id = format!("{}/[method:{}]", class_id, display_name);
        return PlanNode {
            identifier: identifier(&unique_id, &display_name, TestType::Test, node),
            children: Vec::new(),
            executable: Executable::Skip(reason.clone()),
        };
    }

    if method.rows.is_empty() {
        let node = method_node(method, class_name, project, source, TestKind::JUnit5);
        let unique_id = format!("{}/[method:{}]", class_id, display_name);
        return PlanNode {
            identifier: identifier(&unique_id, &display_name, TestType::Test, node),
            children: Vec::new(),
            executable: Executable::Invoke {
                method: method.clone(),
                args: Vec::new(),
            },
        };
    }

    let mut template_node = method_node(method, class_name, project, source, TestKind::JUnit5);
    template_node.level = TestLevel::Suite;
    let template_id = format!("{}/[test-template:{}]", class_id, display_name);
    let mut template = PlanNode::container(identifier(&template_id, &display_name, TestType::Container, template_node.clone()));

    for (i, row) in method.rows.iter().enumerate() {
        let n = i + 1;
        let label = format!("[{}] {}", n, row.join(", "));
        let node = TestNode::new(
            &label,
            &format!("{}#{}[{}]", class_name, method.name, n),
            project,
            source,
            template_node.location.as_ref().and_then(|l| l.range),
            TestLevel::Case,
            TestKind::JUnit5,
        );
        let unique_id = format!("{}/[test-template-invocation:#{}]", template_id, n);
        template.push(PlanNode {
            identifier: identifier(&unique_id, &label, TestType::Test, node),
            children: Vec::new(),
            executable: Executable::Invoke {
                method: method.clone(),
                args: row.clone(),
            },
        });
    }

    template
}

fn missing_method(class_name: &str, class_id: &str, method: &str, project: &str, why: &str) -> PlanNode {
    let display_name = format!("{}()", method);
    let unique_id = format!("{}/[method:{}]", class_id, display_name);
    let node = TestNode::case(method, &format!("{}#{}", class_name, method), project, TestKind::JUnit5);
    PlanNode {
        identifier: identifier(&unique_id, &display_name, TestType::Test, node),
        children: Vec::new(),
        executable: Executable::Skip(format!("{}: {}#{}", why, class_name, method)),
    }
}

fn execute_node(plan_node: &PlanNode, listener: &mut dyn TestExecutionListener) -> Result<()> {
    let identifier = &plan_node.identifier;

    match plan_node.executable {
        Executable::Skip(ref reason) => {
            listener.execution_skipped(identifier, reason)?;
        }
        Executable::Container => {
            let start = Instant::now();
            listener.execution_started(identifier)?;
            for child in &plan_node.children {
                execute_node(child, listener)?;
            }
            listener.execution_finished(identifier, &TestExecutionResult::successful(elapsed_ms(start)))?;
        }
        Executable::Invoke { ref method, ref args } => {
            let start = Instant::now();
            listener.execution_started(identifier)?;
            let outcome = method.invoke(args);
            let duration_ms = elapsed_ms(start);

            let result = match outcome {
                TestOutcome::Passed => TestExecutionResult::successful(duration_ms),
                TestOutcome::Failed(failure) => TestExecutionResult {
                    status: Status::Failed,
                    failure: Some(failure),
                    duration_ms,
                },
                TestOutcome::Aborted(reason) => {
                    debug!("Aborted {}: {}", identifier.unique_id, reason);
                    TestExecutionResult {
                        status: Status::Aborted,
                        failure: None,
                        duration_ms,
                    }
                }
            };
            listener.execution_finished(identifier, &result)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_catalog;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl TestExecutionListener for Recorder {
        fn execution_skipped(&mut self, id: &TestIdentifier, reason: &str) -> Result<()> {
            self.events.push(format!("skip {} ({})", id.unique_id, reason));
            Ok(())
        }

        fn execution_started(&mut self, id: &TestIdentifier) -> Result<()> {
            self.events.push(format!("start {}", id.unique_id));
            Ok(())
        }

        fn execution_finished(&mut self, id: &TestIdentifier, result: &TestExecutionResult) -> Result<()> {
            self.events.push(format!("finish {} {:?}", id.unique_id, result.status));
            Ok(())
        }
    }

    #[test]
    fn test_discover_whole_class() {
        let catalog = sample_catalog();
        let launcher = Launcher::new(&catalog);
        let plan = launcher.discover(&LauncherDiscoveryRequest::from_selection(&Selection::parse(&["CLASScom.acme.Calc"])));

        let class_id = "[engine:junit-jupiter]/[class:com.acme.Calc]";
        let children = plan.get_children(class_id);
        let ids: Vec<_> = children.iter().map(|c| c.unique_id.as_str()).collect();
        assert!(ids.contains(&"[engine:junit-jupiter]/[class:com.acme.Calc]/[method:testAdd()]"));
        assert!(ids.contains(&"[engine:junit-jupiter]/[class:com.acme.Calc]/[test-template:testTable()]"));
        assert!(ids.contains(&"[engine:junit-jupiter]/[class:com.acme.Calc]/[nested-class:Inner]"));
        assert_eq!(children[0].parent_id.as_deref(), Some(class_id));

        let invocations = plan.get_children("[engine:junit-jupiter]/[class:com.acme.Calc]/[test-template:testTable()]");
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[1].node.label, "[2] 2, 3");
        // testAdd, testDivide, testIgnored, testAssume, 2 invocations, testDeep
        assert_eq!(plan.count_tests(), 7);
    }

    #[test]
    fn test_method_selectors_share_container() {
        let catalog = sample_catalog();
        let launcher = Launcher::new(&catalog);
        let selection = Selection::parse(&["METHODtestAdd:com.acme.Calc", "METHODtestDivide:com.acme.Calc"]);
        let plan = launcher.discover(&LauncherDiscoveryRequest::from_selection(&selection));

        assert_eq!(plan.engine.children.len(), 1);
        assert_eq!(plan.count_tests(), 2);
    }

    #[test]
    fn test_execution_events() {
        let catalog = sample_catalog();
        let launcher = Launcher::new(&catalog);
        let selection = Selection::parse(&["METHODtestAssume:com.acme.Calc", "METHODtestIgnored:com.acme.Calc"]);
        let plan = launcher.discover(&LauncherDiscoveryRequest::from_selection(&selection));

        let mut recorder = Recorder::default();
        launcher.execute(&plan, &mut recorder).unwrap();

        let class_id = "[engine:junit-jupiter]/[class:com.acme.Calc]";
        assert_eq!(
            recorder.events,
            vec![
                "start [engine:junit-jupiter]".to_string(),
                format!("start {}", class_id),
                format!("start {}/[method:testAssume()]", class_id),
                format!("finish {}/[method:testAssume()] Aborted", class_id),
                format!("skip {}/[method:testIgnored()] (not ready)", class_id),
                format!("finish {} Successful", class_id),
                "finish [engine:junit-jupiter] Successful".to_string(),
            ]
        );
    }

    #[test]
    fn test_unknown_class_is_a_skipped_container() {
        let catalog = sample_catalog();
        let launcher = Launcher::new(&catalog);
        let selection = Selection::parse(&["METHODtestX:com.acme.Missing"]);
        let plan = launcher.discover(&LauncherDiscoveryRequest::from_selection(&selection));

        let mut recorder = Recorder::default();
        launcher.execute(&plan, &mut recorder).unwrap();

        assert_eq!(plan.count_tests(), 1);
        assert!(recorder.events[1].starts_with("skip [engine:junit-jupiter]/[class:com.acme.Missing]"));
        assert!(recorder.events[1].contains("Class not found"));
    }

    #[test]
    fn test_unknown_whole_class_holds_a_placeholder() {
        let catalog = sample_catalog();
        let launcher = Launcher::new(&catalog);
        let plan = launcher.discover(&LauncherDiscoveryRequest::from_selection(&Selection::parse(&["CLASScom.acme.Missing"])));

        assert!(plan.contains_tests());
        let children = plan.get_children("[engine:junit-jupiter]/[class:com.acme.Missing]");
        assert_eq!(children.len(), 1);
        assert!(children[0].is_test());
        assert_eq!(children[0].node.label, "Missing");
        assert_eq!(children[0].node.full_name, "com.acme.Missing#Missing");
    }
}
