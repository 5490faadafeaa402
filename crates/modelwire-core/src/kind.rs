use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete type of an element in the model graph.
///
/// Compared by value everywhere; the wire tag is produced by [`ElementKind::tag`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Project,
    Model,
    Package,
    // Diagrams
    ClassDiagram,
    ErdDiagram,
    UseCaseDiagram,
    SequenceDiagram,
    TimingDiagram,
    FlowchartDiagram,
    // Auto-created containers
    Collaboration,
    Interaction,
    ErdDataModel,
    // Class family
    Class,
    Interface,
    Enumeration,
    Attribute,
    Operation,
    EnumerationLiteral,
    Port,
    Tag,
    Association,
    Generalization,
    Dependency,
    InterfaceRealization,
    // ERD family
    ErdEntity,
    ErdColumn,
    ErdRelationship,
    // Use case family
    Actor,
    UseCase,
    UseCaseSubject,
    Include,
    Extend,
    // Sequence family
    Lifeline,
    Message,
    // Timing family
    TimingLifeline,
    TimingState,
    // Flowchart family
    FlowchartProcess,
    FlowchartDecision,
    FlowchartTerminal,
    FlowchartData,
    FlowchartFlow,
}

/// Visual role of a view on a diagram.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ViewKind {
    /// Outermost view of a diagram; its model is the diagram itself.
    Frame,
    Node,
    /// Node view anchored on another node view.
    Port,
    Edge,
    /// Frame-tracking view: its width always equals the frame's width.
    Lane,
    /// Pure decoration without a model element.
    Note,
}

impl ViewKind {
    pub fn is_frame(self) -> bool {
        self == ViewKind::Frame
    }

    pub fn is_frame_tracking(self) -> bool {
        self == ViewKind::Lane
    }

    pub fn is_edge(self) -> bool {
        self == ViewKind::Edge
    }
}

impl ElementKind {
    pub const ALL: &'static [ElementKind] = &[
        ElementKind::Project,
        ElementKind::Model,
        ElementKind::Package,
        ElementKind::ClassDiagram,
        ElementKind::ErdDiagram,
        ElementKind::UseCaseDiagram,
        ElementKind::SequenceDiagram,
        ElementKind::TimingDiagram,
        ElementKind::FlowchartDiagram,
        ElementKind::Collaboration,
        ElementKind::Interaction,
        ElementKind::ErdDataModel,
        ElementKind::Class,
        ElementKind::Interface,
        ElementKind::Enumeration,
        ElementKind::Attribute,
        ElementKind::Operation,
        ElementKind::EnumerationLiteral,
        ElementKind::Port,
        ElementKind::Tag,
        ElementKind::Association,
        ElementKind::Generalization,
        ElementKind::Dependency,
        ElementKind::InterfaceRealization,
        ElementKind::ErdEntity,
        ElementKind::ErdColumn,
        ElementKind::ErdRelationship,
        ElementKind::Actor,
        ElementKind::UseCase,
        ElementKind::UseCaseSubject,
        ElementKind::Include,
        ElementKind::Extend,
        ElementKind::Lifeline,
        ElementKind::Message,
        ElementKind::TimingLifeline,
        ElementKind::TimingState,
        ElementKind::FlowchartProcess,
        ElementKind::FlowchartDecision,
        ElementKind::FlowchartTerminal,
        ElementKind::FlowchartData,
        ElementKind::FlowchartFlow,
    ];

    /// Wire name of the kind, as emitted in the `type` field of responses.
    pub const fn tag(self) -> &'static str {
        match self {
            ElementKind::Project => "Project",
            ElementKind::Model => "Model",
            ElementKind::Package => "Package",
            ElementKind::ClassDiagram => "ClassDiagram",
            ElementKind::ErdDiagram => "ErdDiagram",
            ElementKind::UseCaseDiagram => "UseCaseDiagram",
            ElementKind::SequenceDiagram => "SequenceDiagram",
            ElementKind::TimingDiagram => "TimingDiagram",
            ElementKind::FlowchartDiagram => "FlowchartDiagram",
            ElementKind::Collaboration => "Collaboration",
            ElementKind::Interaction => "Interaction",
            ElementKind::ErdDataModel => "ErdDataModel",
            ElementKind::Class => "Class",
            ElementKind::Interface => "Interface",
            ElementKind::Enumeration => "Enumeration",
            ElementKind::Attribute => "Attribute",
            ElementKind::Operation => "Operation",
            ElementKind::EnumerationLiteral => "EnumerationLiteral",
            ElementKind::Port => "Port",
            ElementKind::Tag => "Tag",
            ElementKind::Association => "Association",
            ElementKind::Generalization => "Generalization",
            ElementKind::Dependency => "Dependency",
            ElementKind::InterfaceRealization => "InterfaceRealization",
            ElementKind::ErdEntity => "ErdEntity",
            ElementKind::ErdColumn => "ErdColumn",
            ElementKind::ErdRelationship => "ErdRelationship",
            ElementKind::Actor => "Actor",
            ElementKind::UseCase => "UseCase",
            ElementKind::UseCaseSubject => "UseCaseSubject",
            ElementKind::Include => "Include",
            ElementKind::Extend => "Extend",
            ElementKind::Lifeline => "Lifeline",
            ElementKind::Message => "Message",
            ElementKind::TimingLifeline => "TimingLifeline",
            ElementKind::TimingState => "TimingState",
            ElementKind::FlowchartProcess => "FlowchartProcess",
            ElementKind::FlowchartDecision => "FlowchartDecision",
            ElementKind::FlowchartTerminal => "FlowchartTerminal",
            ElementKind::FlowchartData => "FlowchartData",
            ElementKind::FlowchartFlow => "FlowchartFlow",
        }
    }

    pub fn from_tag(tag: &str) -> Option<ElementKind> {
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    pub fn is_diagram(self) -> bool {
        matches!(
            self,
            ElementKind::ClassDiagram
                | ElementKind::ErdDiagram
                | ElementKind::UseCaseDiagram
                | ElementKind::SequenceDiagram
                | ElementKind::TimingDiagram
                | ElementKind::FlowchartDiagram
        )
    }

    /// Intermediate owners created implicitly for a diagram and removed once empty.
    pub fn is_auto_container(self) -> bool {
        matches!(
            self,
            ElementKind::Collaboration | ElementKind::Interaction | ElementKind::ErdDataModel
        )
    }

    pub fn is_relation(self) -> bool {
        matches!(
            self,
            ElementKind::Association
                | ElementKind::Generalization
                | ElementKind::Dependency
                | ElementKind::InterfaceRealization
                | ElementKind::ErdRelationship
                | ElementKind::Include
                | ElementKind::Extend
                | ElementKind::Message
                | ElementKind::FlowchartFlow
        )
    }

    /// View kind used when the element is placed on a diagram, if it has one.
    pub fn view_kind(self) -> Option<ViewKind> {
        if self.is_relation() {
            return Some(ViewKind::Edge);
        }
        match self {
            ElementKind::Package
            | ElementKind::Class
            | ElementKind::Interface
            | ElementKind::Enumeration
            | ElementKind::ErdEntity
            | ElementKind::Actor
            | ElementKind::UseCase
            | ElementKind::UseCaseSubject
            | ElementKind::Lifeline
            | ElementKind::FlowchartProcess
            | ElementKind::FlowchartDecision
            | ElementKind::FlowchartTerminal
            | ElementKind::FlowchartData => Some(ViewKind::Node),
            ElementKind::Port => Some(ViewKind::Port),
            ElementKind::TimingLifeline => Some(ViewKind::Lane),
            _ => None,
        }
    }

    /// Kinds that the factory refuses to build without a view of their parent.
    pub fn requires_view(self) -> bool {
        self == ElementKind::Port
    }

    /// Fields holding the id of another element.
    pub fn reference_fields(self) -> &'static [&'static str] {
        if self.is_relation() {
            return &["source", "target"];
        }
        match self {
            ElementKind::ErdColumn => &["referenceTo"],
            ElementKind::Lifeline => &["represent"],
            ElementKind::Tag => &["reference"],
            _ => &[],
        }
    }

    /// Kind a reference field must point at, when it is restricted.
    pub fn reference_kind(self, field: &str) -> Option<ElementKind> {
        match (self, field) {
            (ElementKind::ErdColumn, "referenceTo") => Some(ElementKind::ErdColumn),
            (ElementKind::Lifeline, "represent") => Some(ElementKind::Attribute),
            _ => None,
        }
    }

    /// Reference field whose target is renamed along with this element.
    pub fn linked_field(self) -> Option<&'static str> {
        match self {
            ElementKind::Lifeline => Some("represent"),
            _ => None,
        }
    }

    /// Containers created between the requested parent and a new diagram of this kind.
    pub fn container_chain(self) -> &'static [ElementKind] {
        match self {
            ElementKind::SequenceDiagram | ElementKind::TimingDiagram => {
                &[ElementKind::Collaboration, ElementKind::Interaction]
            }
            ElementKind::ErdDiagram => &[ElementKind::ErdDataModel],
            _ => &[],
        }
    }

    /// Whether the host can place a view of this kind on a diagram of kind `diagram`.
    pub fn placeable_on(self, diagram: ElementKind) -> bool {
        use ElementKind::*;
        match self {
            Class | Interface | Enumeration | Port | InterfaceRealization => diagram == ClassDiagram,
            Package | Association | Generalization | Dependency => {
                matches!(diagram, ClassDiagram | UseCaseDiagram)
            }
            ErdEntity | ErdRelationship => diagram == ErdDiagram,
            Actor | UseCase | UseCaseSubject | Include | Extend => diagram == UseCaseDiagram,
            Lifeline | Message => diagram == SequenceDiagram,
            TimingLifeline => diagram == TimingDiagram,
            FlowchartProcess | FlowchartDecision | FlowchartTerminal | FlowchartData
            | FlowchartFlow => diagram == FlowchartDiagram,
            _ => false,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_for_every_kind() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(ElementKind::from_tag("Nope"), None);
    }

    #[test]
    fn relations_are_edges_with_endpoint_references() {
        for kind in ElementKind::ALL.iter().filter(|k| k.is_relation()) {
            assert_eq!(kind.view_kind(), Some(ViewKind::Edge));
            assert_eq!(kind.reference_fields(), &["source", "target"]);
        }
    }

    #[test]
    fn lanes_are_the_only_frame_tracking_views() {
        assert!(ViewKind::Lane.is_frame_tracking());
        assert!(!ViewKind::Node.is_frame_tracking());
        assert_eq!(ElementKind::TimingLifeline.view_kind(), Some(ViewKind::Lane));
    }

    #[test]
    fn diagrams_have_no_view_of_their_own() {
        for kind in ElementKind::ALL.iter().filter(|k| k.is_diagram()) {
            assert_eq!(kind.view_kind(), None);
        }
    }
}
