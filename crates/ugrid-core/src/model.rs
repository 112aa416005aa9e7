use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::elements::{
    Element, ElementKind, FeederMetadata, Line, Load, Node, Photovoltaic, PowerSource,
    PowerTransformer, RefSlot,
};
use crate::error::{GridError, GridResult};

/// Circuit model: every element, keyed by its unique name.
///
/// Iteration order is insertion order, and removing an element keeps the
/// relative order of the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    elements: IndexMap<String, Element>,
    pub feeder: Option<FeederMetadata>,
}

macro_rules! typed_iter {
    ($name:ident, $name_mut:ident, $variant:ident, $type:ty) => {
        pub fn $name(&self) -> impl Iterator<Item = &$type> {
            self.elements.values().filter_map(|element| match element {
                Element::$variant(inner) => Some(inner),
                _ => None,
            })
        }

        pub fn $name_mut(&mut self) -> impl Iterator<Item = &mut $type> {
            self.elements.values_mut().filter_map(|element| match element {
                Element::$variant(inner) => Some(inner),
                _ => None,
            })
        }
    };
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element. Names must be non-empty and unique.
    pub fn add(&mut self, element: impl Into<Element>) -> GridResult<()> {
        let element = element.into();
        let name = element.name().to_string();
        if name.is_empty() {
            return Err(GridError::MalformedInput(format!(
                "{} without a name",
                element.kind()
            )));
        }
        if self.elements.contains_key(&name) {
            return Err(GridError::DuplicateName(name));
        }
        self.elements.insert(name, element);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Element> {
        self.elements.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    typed_iter!(nodes, nodes_mut, Node, Node);
    typed_iter!(lines, lines_mut, Line, Line);
    typed_iter!(transformers, transformers_mut, Transformer, PowerTransformer);
    typed_iter!(loads, loads_mut, Load, Load);
    typed_iter!(power_sources, power_sources_mut, PowerSource, PowerSource);
    typed_iter!(photovoltaics, photovoltaics_mut, Photovoltaic, Photovoltaic);

    pub fn node(&self, name: &str) -> Option<&Node> {
        match self.elements.get(name) {
            Some(Element::Node(node)) => Some(node),
            _ => None,
        }
    }

    pub fn line(&self, name: &str) -> Option<&Line> {
        match self.elements.get(name) {
            Some(Element::Line(line)) => Some(line),
            _ => None,
        }
    }

    pub fn transformer(&self, name: &str) -> Option<&PowerTransformer> {
        match self.elements.get(name) {
            Some(Element::Transformer(tx)) => Some(tx),
            _ => None,
        }
    }

    pub fn transformer_mut(&mut self, name: &str) -> Option<&mut PowerTransformer> {
        match self.elements.get_mut(name) {
            Some(Element::Transformer(tx)) => Some(tx),
            _ => None,
        }
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        self.elements.values().filter(|e| e.kind() == kind).count()
    }

    /// Elements holding a reference to `target`, with the referencing slot.
    pub fn referencing(&self, target: &str) -> Vec<(String, RefSlot)> {
        self.elements
            .values()
            .flat_map(|element| {
                element
                    .references()
                    .into_iter()
                    .filter(|(_, name)| *name == target)
                    .map(|(slot, _)| (element.name().to_string(), slot))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Point one reference slot of `element` at `target`.
    pub fn retarget(&mut self, element: &str, slot: RefSlot, target: &str) -> GridResult<()> {
        let entry = self
            .elements
            .get_mut(element)
            .ok_or_else(|| GridError::UnknownElement(element.to_string()))?;
        let reference = entry.reference_mut(slot).ok_or_else(|| {
            GridError::MalformedInput(format!("'{element}' has no {slot:?} reference"))
        })?;
        *reference = target.to_string();
        Ok(())
    }

    /// References that name no element of the model: `(element, missing)`.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        self.elements
            .values()
            .flat_map(|element| {
                element
                    .references()
                    .into_iter()
                    .filter(|(_, name)| !self.elements.contains_key(*name))
                    .map(|(_, name)| (element.name().to_string(), name.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            nodes: self.count(ElementKind::Node),
            lines: self.count(ElementKind::Line),
            transformers: self.count(ElementKind::Transformer),
            loads: self.count(ElementKind::Load),
            power_sources: self.count(ElementKind::PowerSource),
            photovoltaics: self.count(ElementKind::Photovoltaic),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub nodes: usize,
    pub lines: usize,
    pub transformers: usize,
    pub loads: usize,
    pub power_sources: usize,
    pub photovoltaics: usize,
}

impl std::fmt::Display for ModelStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} lines, {} transformers, {} loads, {} sources, {} PV systems",
            self.nodes,
            self.lines,
            self.transformers,
            self.loads,
            self.power_sources,
            self.photovoltaics
        )
    }
}
