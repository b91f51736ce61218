//! Element structure read back out of the grammar sources
//!
//! libxml2 reports one content-model violation per parent and then skips the
//! parent's remaining children, and its RelaxNG engine discards the errors
//! raised inside a failed `optional` or `zeroOrMore`. [`ContentModel`] keeps
//! the element structure a grammar declares so that every missing, unexpected
//! and misplaced child can be listed. Elements whose content is not
//! element-only are handed back to libxml2 one at a time, each checked
//! against a standalone grammar declaring just that element.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::LibXml2Result;
use crate::libxml2::{LibXml2Wrapper, XmlDocument, XmlElement};
use crate::xml_codec::escape_into;

const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
const RNG_NAMESPACE: &str = "http://relaxng.org/ns/structure/1.0";

/// One content-model violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A required child does not occur
    Missing { parent: String, child: String },
    /// A child the parent does not declare at all
    Unexpected { parent: String, child: String },
    /// A declared child in a position or count the parent does not allow
    Misplaced { parent: String, child: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing { parent, child } => {
                write!(f, "Element '{}': Missing child element '{}'.", parent, child)
            }
            Violation::Unexpected { parent, child } => write!(
                f,
                "Element '{}': This element is not expected in '{}'.",
                child, parent
            ),
            Violation::Misplaced { parent, child } => write!(
                f,
                "Element '{}': This element is not allowed at this position in '{}'.",
                child, parent
            ),
        }
    }
}

/// How one grammar words model violations and checks standalone elements
pub trait Diagnostics<G> {
    fn violation(&self, violation: &Violation) -> String;

    /// Messages for a document holding one element, or `None` when the
    /// grammar could not be applied to it
    fn isolated(&self, grammar: &G, document: &XmlDocument) -> Option<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Particle {
    declaration: usize,
    min: usize,
    max: Option<usize>,
}

#[derive(Debug, Clone)]
struct Content {
    ordered: bool,
    particles: Vec<Particle>,
}

enum Body<G> {
    /// Element-only content, checked child by child
    Children(Content),
    /// Anything else, checked by libxml2 against this element alone
    Isolated(G),
    /// Neither; documents reaching it are left to whole-document results
    Unsupported,
}

struct Declaration<G> {
    name: String,
    body: Body<G>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Accepted(usize),
    Misplaced(usize),
    Unexpected,
}

/// Declared element structure of one grammar
pub struct ContentModel<G> {
    declarations: Vec<Declaration<G>>,
    roots: Vec<usize>,
}

impl<G> fmt::Debug for ContentModel<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentModel")
            .field("declarations", &self.declarations.len())
            .field("roots", &self.roots.len())
            .finish()
    }
}

impl<G> ContentModel<G> {
    /// Model of an XML Schema (XSD)
    ///
    /// `compile` turns standalone schema text into the grammar used for
    /// elements without element-only content. `None` when `source` is not a
    /// schema document.
    pub fn from_schema(source: &str, compile: impl Fn(&str) -> LibXml2Result<G>) -> Option<Self> {
        let document = LibXml2Wrapper::new().parse_document(source).ok()?;
        let root = document.root()?;
        if !is_in(root, XSD_NAMESPACE, "schema") {
            return None;
        }

        let mut reader = SchemaReader::new(root, compile);
        let roots = root
            .children()
            .filter(|child| is_in(*child, XSD_NAMESPACE, "element"))
            .map(|global| reader.declaration(global))
            .collect();

        Some(ContentModel {
            declarations: reader.declarations,
            roots,
        })
    }

    /// Model of a RelaxNG grammar in XML syntax
    ///
    /// Same contract as [`ContentModel::from_schema`].
    pub fn from_pattern(source: &str, compile: impl Fn(&str) -> LibXml2Result<G>) -> Option<Self> {
        let document = LibXml2Wrapper::new().parse_document(source).ok()?;
        let root = document.root()?;

        let mut reader = PatternReader::new(root, compile);
        let roots = if is_in(root, RNG_NAMESPACE, "grammar") {
            let start = rng_children(root).find(|child| child.name() == "start")?;
            let mut roots = Vec::new();
            for pattern in rng_children(start) {
                roots.extend(reader.start_declarations(pattern));
            }
            roots
        } else if is_in(root, RNG_NAMESPACE, "element") {
            vec![reader.declaration(root)]
        } else {
            return None;
        };

        Some(ContentModel {
            declarations: reader.declarations,
            roots,
        })
    }

    /// Every violation in `document`, in document order per parent
    ///
    /// `None` when part of the document lies outside what the model can
    /// check, such as an undeclared root.
    pub fn explain<D: Diagnostics<G>>(
        &self,
        document: &XmlDocument,
        diagnostics: &D,
    ) -> Option<Vec<String>> {
        let root = document.root()?;
        let index = self
            .roots
            .iter()
            .copied()
            .find(|&index| self.declarations[index].name == root.name())?;

        let mut messages = Vec::new();
        self.walk(root, index, diagnostics, &mut messages)?;
        Some(messages)
    }

    fn walk<D: Diagnostics<G>>(
        &self,
        element: XmlElement<'_>,
        index: usize,
        diagnostics: &D,
        messages: &mut Vec<String>,
    ) -> Option<()> {
        let declaration = &self.declarations[index];
        let content = match &declaration.body {
            Body::Unsupported => return None,
            Body::Isolated(grammar) => {
                let standalone = XmlDocument::from_element(element).ok()?;
                messages.extend(diagnostics.isolated(grammar, &standalone)?);
                return Some(());
            }
            Body::Children(content) => content,
        };

        let children: Vec<XmlElement<'_>> = element.children().collect();
        let names: Vec<&str> = children.iter().map(|child| child.name()).collect();
        let slots = self.place(content, &names);
        let parent = &declaration.name;

        for (name, slot) in names.iter().zip(&slots) {
            let violation = match slot {
                Slot::Accepted(_) => continue,
                Slot::Misplaced(_) => Violation::Misplaced {
                    parent: parent.clone(),
                    child: name.to_string(),
                },
                Slot::Unexpected => Violation::Unexpected {
                    parent: parent.clone(),
                    child: name.to_string(),
                },
            };
            messages.push(diagnostics.violation(&violation));
        }
        for child in self.missing(content, &names) {
            messages.push(diagnostics.violation(&Violation::Missing {
                parent: parent.clone(),
                child,
            }));
        }

        for (child, slot) in children.iter().zip(&slots) {
            if let Slot::Accepted(next) | Slot::Misplaced(next) = slot {
                self.walk(*child, *next, diagnostics, messages)?;
            }
        }
        Some(())
    }

    fn name(&self, particle: &Particle) -> &str {
        &self.declarations[particle.declaration].name
    }

    fn place(&self, content: &Content, names: &[&str]) -> Vec<Slot> {
        let assigned = if content.ordered {
            self.align(&content.particles, names)
        } else {
            self.fill(&content.particles, names)
        };

        names
            .iter()
            .zip(assigned)
            .map(|(name, particle)| match particle {
                Some(p) => Slot::Accepted(content.particles[p].declaration),
                None => match content.particles.iter().find(|p| self.name(p) == *name) {
                    Some(p) => Slot::Misplaced(p.declaration),
                    None => Slot::Unexpected,
                },
            })
            .collect()
    }

    /// Unordered content: each child takes the first declared slot with room left
    fn fill(&self, particles: &[Particle], names: &[&str]) -> Vec<Option<usize>> {
        let mut used = vec![0usize; particles.len()];
        names
            .iter()
            .map(|name| {
                let slot = (0..particles.len()).find(|&p| {
                    self.name(&particles[p]) == *name
                        && particles[p].max.is_none_or(|max| used[p] < max)
                })?;
                used[slot] += 1;
                Some(slot)
            })
            .collect()
    }

    /// Ordered content: keep the largest set of children the sequence accepts
    fn align(&self, particles: &[Particle], names: &[&str]) -> Vec<Option<usize>> {
        let mut assigned = vec![None; names.len()];
        if particles.is_empty() {
            return assigned;
        }

        // State (p, k): at particle p with k occurrences of it used. An
        // unbounded particle only needs to know whether it was used.
        let caps: Vec<usize> = particles
            .iter()
            .map(|p| p.max.map_or(1, |max| max.min(names.len())))
            .collect();
        let mut offsets = Vec::with_capacity(caps.len());
        let mut states = 0;
        for cap in &caps {
            offsets.push(states);
            states += cap + 1;
        }
        let state = |p: usize, k: usize| offsets[p] + k;
        let stay = |p: usize, k: usize, name: &str| -> Option<usize> {
            if self.name(&particles[p]) != name {
                return None;
            }
            match particles[p].max {
                None => Some(1),
                Some(_) if k < caps[p] => Some(k + 1),
                Some(_) => None,
            }
        };
        let advances_to = |j: usize, name: &str| {
            self.name(&particles[j]) == name && particles[j].max != Some(0)
        };

        // best[i][s]: most children among names[i..] keepable from state s
        let mut best = vec![vec![0usize; states]; names.len() + 1];
        for i in (0..names.len()).rev() {
            for p in 0..particles.len() {
                for k in 0..=caps[p] {
                    let mut value = best[i + 1][state(p, k)];
                    if let Some(next) = stay(p, k, names[i]) {
                        value = value.max(1 + best[i + 1][state(p, next)]);
                    }
                    for j in p + 1..particles.len() {
                        if advances_to(j, names[i]) {
                            value = value.max(1 + best[i + 1][state(j, 1)]);
                        }
                    }
                    best[i][state(p, k)] = value;
                }
            }
        }

        let (mut p, mut k) = (0, 0);
        for i in 0..names.len() {
            let target = best[i][state(p, k)];
            if target == 0 {
                break;
            }
            if let Some(next) = stay(p, k, names[i])
                && 1 + best[i + 1][state(p, next)] == target
            {
                assigned[i] = Some(p);
                k = next;
                continue;
            }
            if let Some(j) = (p + 1..particles.len())
                .find(|&j| advances_to(j, names[i]) && 1 + best[i + 1][state(j, 1)] == target)
            {
                assigned[i] = Some(j);
                p = j;
                k = 1;
            }
        }
        assigned
    }

    /// Required occurrences absent anywhere among the children
    fn missing(&self, content: &Content, names: &[&str]) -> Vec<String> {
        let mut missing = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for particle in &content.particles {
            let name = self.name(particle);
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);

            let required: usize = content
                .particles
                .iter()
                .filter(|p| self.name(p) == name)
                .map(|p| p.min)
                .sum();
            let present = names.iter().filter(|n| **n == name).count();
            for _ in present..required {
                missing.push(name.to_string());
            }
        }
        missing
    }
}

fn isolate<G>(compile: &impl Fn(&str) -> LibXml2Result<G>, name: &str, text: Option<String>) -> Body<G> {
    let Some(text) = text else {
        debug!(element = name, "Element has no standalone grammar");
        return Body::Unsupported;
    };
    match compile(&text) {
        Ok(grammar) => Body::Isolated(grammar),
        Err(e) => {
            debug!(element = name, error = %e, "Standalone grammar did not compile");
            Body::Unsupported
        }
    }
}

struct SchemaReader<'doc, G, C> {
    root: XmlElement<'doc>,
    globals: HashMap<String, XmlElement<'doc>>,
    complex_types: HashMap<String, XmlElement<'doc>>,
    by_node: HashMap<XmlElement<'doc>, usize>,
    declarations: Vec<Declaration<G>>,
    compile: C,
}

impl<'doc, G, C: Fn(&str) -> LibXml2Result<G>> SchemaReader<'doc, G, C> {
    fn new(root: XmlElement<'doc>, compile: C) -> Self {
        let named = |kind: &str| -> HashMap<String, XmlElement<'doc>> {
            root.children()
                .filter(|child| is_in(*child, XSD_NAMESPACE, kind))
                .filter_map(|child| Some((child.attribute("name")?, child)))
                .collect()
        };

        SchemaReader {
            root,
            globals: named("element"),
            complex_types: named("complexType"),
            by_node: HashMap::new(),
            declarations: Vec::new(),
            compile,
        }
    }

    fn declaration(&mut self, node: XmlElement<'doc>) -> usize {
        if let Some(reference) = node.attribute("ref") {
            let name = local_name(&reference);
            return match self.globals.get(name).copied() {
                Some(global) => self.declaration(global),
                None => push(&mut self.declarations, name.to_string(), Body::Unsupported),
            };
        }
        if let Some(&index) = self.by_node.get(&node) {
            return index;
        }

        let name = node.attribute("name").unwrap_or_default();
        let index = push(&mut self.declarations, name.clone(), Body::Unsupported);
        self.by_node.insert(node, index);

        let body = match self.element_content(node) {
            Some(content) => Body::Children(content),
            None => isolate(&self.compile, &name, self.standalone_schema(node, &name)),
        };
        self.declarations[index].body = body;
        index
    }

    fn element_content(&mut self, node: XmlElement<'doc>) -> Option<Content> {
        let complex = match xsd_child(node, "complexType") {
            Some(inline) => inline,
            None => {
                let type_name = node.attribute("type")?;
                self.complex_types.get(local_name(&type_name)).copied()?
            }
        };
        if complex.attribute("mixed").as_deref() == Some("true") {
            return None;
        }

        let mut compositor = None;
        for child in complex.children() {
            if child.namespace() != Some(XSD_NAMESPACE) {
                return None;
            }
            match child.name() {
                "annotation" | "attribute" | "attributeGroup" | "anyAttribute" => {}
                "sequence" | "all" if compositor.is_none() => compositor = Some(child),
                _ => return None,
            }
        }
        let Some(compositor) = compositor else {
            return Some(Content {
                ordered: true,
                particles: Vec::new(),
            });
        };
        if occurs(compositor)? != (1, Some(1)) {
            return None;
        }

        let mut particles = Vec::new();
        for child in compositor.children() {
            if is_in(child, XSD_NAMESPACE, "annotation") {
                continue;
            }
            if !is_in(child, XSD_NAMESPACE, "element") {
                return None;
            }
            let (min, max) = occurs(child)?;
            particles.push(Particle {
                declaration: self.declaration(child),
                min,
                max,
            });
        }

        Some(Content {
            ordered: compositor.name() == "sequence",
            particles,
        })
    }

    /// The schema's own components with `node` declared as a global element
    fn standalone_schema(&self, node: XmlElement<'doc>, name: &str) -> Option<String> {
        let root = self.root;
        let is_global = node.parent() == Some(root);
        // A local declaration moved to the top level would change namespace.
        if !is_global
            && root.attribute("targetNamespace").is_some()
            && root.attribute("elementFormDefault").as_deref() != Some("qualified")
        {
            return None;
        }

        let schema = root_name(root);
        let mut text = String::new();
        open_tag(&mut text, &schema, &scope_declarations(node), &root.attributes());

        if is_global {
            text.push_str(&node.to_xml_string().ok()?);
        } else {
            let element = qualified(node.prefix(), "element");
            let attributes: Vec<(String, String)> = node
                .attributes()
                .into_iter()
                .filter(|(attr, _)| !matches!(attr.as_str(), "minOccurs" | "maxOccurs" | "form"))
                .collect();
            let children: Vec<XmlElement<'_>> = node.children().collect();

            if children.is_empty() {
                open_tag(&mut text, &element, &[], &attributes);
                text.insert(text.len() - 1, '/');
            } else {
                open_tag(&mut text, &element, &[], &attributes);
                for child in children {
                    text.push_str(&child.to_xml_string().ok()?);
                }
                close_tag(&mut text, &element);
            }
        }

        for component in root.children() {
            let same_name = is_in(component, XSD_NAMESPACE, "element")
                && component.attribute("name").as_deref() == Some(name);
            if component == node || same_name {
                continue;
            }
            text.push_str(&component.to_xml_string().ok()?);
        }

        close_tag(&mut text, &schema);
        Some(text)
    }
}

struct PatternReader<'doc, G, C> {
    root: XmlElement<'doc>,
    defines: HashMap<String, XmlElement<'doc>>,
    by_node: HashMap<XmlElement<'doc>, usize>,
    declarations: Vec<Declaration<G>>,
    compile: C,
}

impl<'doc, G, C: Fn(&str) -> LibXml2Result<G>> PatternReader<'doc, G, C> {
    fn new(root: XmlElement<'doc>, compile: C) -> Self {
        let defines = if is_in(root, RNG_NAMESPACE, "grammar") {
            rng_children(root)
                .filter(|child| child.name() == "define")
                .filter_map(|define| Some((define.attribute("name")?, define)))
                .collect()
        } else {
            HashMap::new()
        };

        PatternReader {
            root,
            defines,
            by_node: HashMap::new(),
            declarations: Vec::new(),
            compile,
        }
    }

    fn start_declarations(&mut self, pattern: XmlElement<'doc>) -> Vec<usize> {
        match pattern.name() {
            "element" => vec![self.declaration(pattern)],
            "ref" => {
                let element = pattern
                    .attribute("name")
                    .and_then(|name| self.define_element(&name));
                element
                    .map(|element| vec![self.declaration(element)])
                    .unwrap_or_default()
            }
            "choice" => rng_children(pattern)
                .flat_map(|alternative| self.start_declarations(alternative))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The element a define consists of, when it is exactly one element pattern
    fn define_element(&self, name: &str) -> Option<XmlElement<'doc>> {
        let define = self.defines.get(name)?;
        let mut patterns = rng_children(*define);
        match (patterns.next(), patterns.next()) {
            (Some(element), None) if element.name() == "element" => Some(element),
            _ => None,
        }
    }

    fn declaration(&mut self, node: XmlElement<'doc>) -> usize {
        if let Some(&index) = self.by_node.get(&node) {
            return index;
        }

        let name = node
            .attribute("name")
            .or_else(|| {
                rng_children(node)
                    .find(|child| child.name() == "name")
                    .map(|child| child.text())
            })
            .map(|name| local_name(name.trim()).to_string())
            .unwrap_or_default();
        let index = push(&mut self.declarations, name.clone(), Body::Unsupported);
        self.by_node.insert(node, index);

        let body = match self.element_content(node) {
            Some(content) => Body::Children(content),
            None => isolate(&self.compile, &name, self.standalone_pattern(node)),
        };
        self.declarations[index].body = body;
        index
    }

    fn element_content(&mut self, node: XmlElement<'doc>) -> Option<Content> {
        let patterns: Vec<XmlElement<'doc>> = rng_children(node)
            .filter(|child| !matches!(child.name(), "name" | "anyName" | "nsName"))
            .collect();
        let (ordered, items): (bool, Vec<XmlElement<'doc>>) = match patterns.as_slice() {
            [single] if single.name() == "interleave" => (false, rng_children(*single).collect()),
            [single] if single.name() == "group" => (true, rng_children(*single).collect()),
            _ => (true, patterns.clone()),
        };
        if items.is_empty() {
            return None;
        }

        let mut particles = Vec::with_capacity(items.len());
        for item in items {
            particles.push(self.particle(item)?);
        }
        Some(Content { ordered, particles })
    }

    fn particle(&mut self, pattern: XmlElement<'doc>) -> Option<Particle> {
        let once = |declaration| Particle {
            declaration,
            min: 1,
            max: Some(1),
        };

        match pattern.name() {
            "element" => Some(once(self.declaration(pattern))),
            "ref" => {
                let name = pattern.attribute("name")?;
                let element = self.define_element(&name)?;
                Some(once(self.declaration(element)))
            }
            "optional" | "zeroOrMore" | "oneOrMore" => {
                let mut inner = rng_children(pattern);
                let (Some(single), None) = (inner.next(), inner.next()) else {
                    return None;
                };
                let base = self.particle(single)?;
                if (base.min, base.max) != (1, Some(1)) {
                    return None;
                }
                let (min, max) = match pattern.name() {
                    "optional" => (0, Some(1)),
                    "zeroOrMore" => (0, None),
                    _ => (1, None),
                };
                Some(Particle { min, max, ..base })
            }
            _ => None,
        }
    }

    /// A grammar whose start is `node`, keeping every define it may refer to
    fn standalone_pattern(&self, node: XmlElement<'doc>) -> Option<String> {
        let grammar = qualified(node.prefix(), "grammar");
        let start = qualified(node.prefix(), "start");
        let inherited: Vec<(String, String)> = ["datatypeLibrary", "ns"]
            .into_iter()
            .filter_map(|attr| Some((attr.to_string(), inherited_attribute(node, attr)?)))
            .collect();

        let mut text = String::new();
        open_tag(&mut text, &grammar, &scope_declarations(node), &inherited);
        open_tag(&mut text, &start, &[], &[]);
        text.push_str(&node.to_xml_string().ok()?);
        close_tag(&mut text, &start);

        if is_in(self.root, RNG_NAMESPACE, "grammar") {
            for define in rng_children(self.root).filter(|child| child.name() == "define") {
                text.push_str(&define.to_xml_string().ok()?);
            }
        }

        close_tag(&mut text, &grammar);
        Some(text)
    }
}

fn push<G>(declarations: &mut Vec<Declaration<G>>, name: String, body: Body<G>) -> usize {
    declarations.push(Declaration { name, body });
    declarations.len() - 1
}

fn is_in(element: XmlElement<'_>, namespace: &str, name: &str) -> bool {
    element.namespace() == Some(namespace) && element.name() == name
}

fn xsd_child<'doc>(element: XmlElement<'doc>, name: &str) -> Option<XmlElement<'doc>> {
    element
        .children()
        .find(|child| is_in(*child, XSD_NAMESPACE, name))
}

fn rng_children<'doc>(element: XmlElement<'doc>) -> impl Iterator<Item = XmlElement<'doc>> {
    element
        .children()
        .filter(|child| child.namespace() == Some(RNG_NAMESPACE))
}

fn occurs(element: XmlElement<'_>) -> Option<(usize, Option<usize>)> {
    let min = match element.attribute("minOccurs") {
        Some(value) => value.trim().parse().ok()?,
        None => 1,
    };
    let max = match element.attribute("maxOccurs").as_deref().map(str::trim) {
        Some("unbounded") => None,
        Some(value) => Some(value.parse().ok()?),
        None => Some(1),
    };
    Some((min, max))
}

fn inherited_attribute(element: XmlElement<'_>, name: &str) -> Option<String> {
    let mut cursor = Some(element);
    while let Some(current) = cursor {
        if let Some(value) = current.attribute(name) {
            return Some(value);
        }
        cursor = current.parent();
    }
    None
}

/// Namespace declarations in scope at `element`, innermost first
fn scope_declarations(element: XmlElement<'_>) -> Vec<(Option<String>, String)> {
    let mut declarations: Vec<(Option<String>, String)> = Vec::new();
    let mut cursor = Some(element);
    while let Some(current) = cursor {
        for (prefix, uri) in current.namespace_declarations() {
            if !declarations.iter().any(|(known, _)| *known == prefix) {
                declarations.push((prefix, uri));
            }
        }
        cursor = current.parent();
    }
    declarations
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

fn root_name(root: XmlElement<'_>) -> String {
    qualified(root.prefix(), root.name())
}

fn open_tag(
    out: &mut String,
    name: &str,
    declarations: &[(Option<String>, String)],
    attributes: &[(String, String)],
) {
    out.push('<');
    out.push_str(name);
    for (prefix, uri) in declarations {
        let attr = match prefix {
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };
        push_attribute(out, &attr, uri);
    }
    for (attr, value) in attributes {
        push_attribute(out, attr, value);
    }
    out.push('>');
}

fn close_tag(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(out, value, true);
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the standalone grammar text instead of compiling it
    fn model_of_schema(source: &str) -> ContentModel<String> {
        ContentModel::from_schema(source, |text| Ok(text.to_string())).unwrap()
    }

    fn model_of_pattern(source: &str) -> ContentModel<String> {
        ContentModel::from_pattern(source, |text| Ok(text.to_string())).unwrap()
    }

    struct Plain;

    impl Diagnostics<String> for Plain {
        fn violation(&self, violation: &Violation) -> String {
            violation.to_string()
        }

        fn isolated(&self, _grammar: &String, _document: &XmlDocument) -> Option<Vec<String>> {
            Some(Vec::new())
        }
    }

    fn explain(model: &ContentModel<String>, xml: &str) -> Option<Vec<String>> {
        let document = LibXml2Wrapper::new().parse_document(xml).unwrap();
        model.explain(&document, &Plain)
    }

    const RECORD_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="record" type="RecordType"/>
  <xs:complexType name="RecordType">
    <xs:sequence>
      <xs:element name="a" type="xs:string"/>
      <xs:element name="b" type="xs:int"/>
      <xs:element name="c" type="xs:string"/>
      <xs:element name="d" type="xs:string"/>
      <xs:element name="tags">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="tag" type="xs:string" minOccurs="0" maxOccurs="unbounded"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#;

    const RECORD_RNG: &str = r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0"
         datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes">
  <start><ref name="record"/></start>
  <define name="record">
    <element name="record">
      <interleave>
        <element name="a"><text/></element>
        <element name="b"><data type="int"/></element>
        <optional><element name="c"><text/></element></optional>
      </interleave>
    </element>
  </define>
</grammar>"#;

    #[test]
    fn test_valid_sequence_has_no_violations() {
        let model = model_of_schema(RECORD_XSD);
        let xml = "<record><a/><b>1</b><c/><d/><tags><tag/><tag/><tag/></tags></record>";
        assert_eq!(explain(&model, xml), Some(vec![]));
    }

    #[test]
    fn test_every_missing_and_unexpected_child_is_listed() {
        let model = model_of_schema(RECORD_XSD);
        let xml = "<record><a/><extra/><d/><tags/></record>";

        assert_eq!(
            explain(&model, xml).unwrap(),
            vec![
                "Element 'extra': This element is not expected in 'record'.",
                "Element 'record': Missing child element 'b'.",
                "Element 'record': Missing child element 'c'.",
            ]
        );
    }

    #[test]
    fn test_swapped_siblings_count_once() {
        let model = model_of_schema(RECORD_XSD);
        let xml = "<record><a/><c/><b>1</b><d/><tags/></record>";

        let violations = explain(&model, xml).unwrap();
        assert_eq!(violations.len(), 1, "{:?}", violations);
        assert!(violations[0].contains("not allowed at this position"));
    }

    #[test]
    fn test_repeated_single_child_is_misplaced() {
        let model = model_of_schema(RECORD_XSD);
        let xml = "<record><a/><a/><b>1</b><c/><d/><tags/></record>";

        assert_eq!(
            explain(&model, xml).unwrap(),
            vec!["Element 'a': This element is not allowed at this position in 'record'."]
        );
    }

    #[test]
    fn test_nested_content_is_checked() {
        let model = model_of_schema(RECORD_XSD);
        let xml = "<record><a/><b>1</b><c/><d/><tags><tag/><label/></tags></record>";

        assert_eq!(
            explain(&model, xml).unwrap(),
            vec!["Element 'label': This element is not expected in 'tags'."]
        );
    }

    #[test]
    fn test_standalone_schema_declares_the_leaf_globally() {
        let model = model_of_schema(RECORD_XSD);
        let leaf = model
            .declarations
            .iter()
            .find(|d| d.name == "b")
            .unwrap();

        match &leaf.body {
            Body::Isolated(text) => {
                assert!(text.starts_with(r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">"#));
                assert!(text.contains(r#"<xs:element name="b" type="xs:int"/>"#));
                assert!(text.contains(r#"<xs:complexType name="RecordType">"#));
                assert!(text.ends_with("</xs:schema>"));
            }
            _ => panic!("leaf should be checked on its own"),
        }
    }

    #[test]
    fn test_undeclared_root_is_outside_the_model() {
        let model = model_of_schema(RECORD_XSD);
        assert_eq!(explain(&model, "<other/>"), None);
    }

    #[test]
    fn test_interleave_ignores_order_but_not_presence() {
        let model = model_of_pattern(RECORD_RNG);

        assert_eq!(explain(&model, "<record><b>1</b><a/></record>"), Some(vec![]));
        assert_eq!(
            explain(&model, "<record><c/><bogus/><c/></record>").unwrap(),
            vec![
                "Element 'bogus': This element is not expected in 'record'.",
                "Element 'c': This element is not allowed at this position in 'record'.",
                "Element 'record': Missing child element 'a'.",
                "Element 'record': Missing child element 'b'.",
            ]
        );
    }

    #[test]
    fn test_standalone_pattern_keeps_datatype_library() {
        let model = model_of_pattern(RECORD_RNG);
        let leaf = model
            .declarations
            .iter()
            .find(|d| d.name == "b")
            .unwrap();

        match &leaf.body {
            Body::Isolated(text) => {
                assert!(text.contains(
                    r#"datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes""#
                ));
                assert!(text.contains(r#"<start><element name="b"><data type="int"/></element></start>"#));
                assert!(text.contains(r#"<define name="record">"#));
            }
            _ => panic!("leaf should be checked on its own"),
        }
    }

    #[test]
    fn test_non_grammar_source_has_no_model() {
        assert!(ContentModel::<String>::from_schema("<notaschema/>", |t| Ok(t.to_string())).is_none());
        assert!(ContentModel::<String>::from_pattern("<notagrammar/>", |t| Ok(t.to_string())).is_none());
    }
}
