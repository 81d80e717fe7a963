//! Extraction of scalar values from EC2 Query API XML responses.
//!
//! Every helper returns a whitespace-trimmed string, empty when the value is
//! absent from the response.

use roxmltree::{Document, Node};

/// Parses `body` into a document, reporting the parser message on failure.
pub(crate) fn parse(body: &str) -> Result<Document<'_>, String> {
    Document::parse(body).map_err(|err| err.to_string())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|candidate| candidate.is_element() && candidate.tag_name().name() == name)
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |candidate| candidate.is_element() && candidate.tag_name().name() == name)
}

fn text_of(node: Option<Node<'_, '_>>) -> String {
    node.and_then(|found| found.text())
        .map(str::trim)
        .unwrap_or_default()
        .to_owned()
}

fn first_descendant<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|candidate| candidate.is_element() && candidate.tag_name().name() == name)
}

/// `DescribeInstanceStatus`: state name of the first status record.
pub(crate) fn instance_state_name(doc: &Document<'_>) -> String {
    let state = first_descendant(doc, "instanceStatusSet")
        .and_then(|set| child(set, "item"))
        .and_then(|item| child(item, "instanceState"))
        .and_then(|state| child(state, "name"));
    text_of(state)
}

/// `RunInstances`: identifier of the first launched instance.
pub(crate) fn launched_instance_id(doc: &Document<'_>) -> String {
    let id = first_descendant(doc, "instancesSet")
        .and_then(|set| child(set, "item"))
        .and_then(|item| child(item, "instanceId"));
    text_of(id)
}

/// A single instance entry from a `DescribeInstances` response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct InstanceEntry {
    pub(crate) instance_id: String,
    pub(crate) state: String,
    pub(crate) public_ip: String,
}

/// `DescribeInstances`: every instance across all reservations, in order.
pub(crate) fn described_instances(doc: &Document<'_>) -> Vec<InstanceEntry> {
    let Some(reservations) = first_descendant(doc, "reservationSet") else {
        return Vec::new();
    };
    children(reservations, "item")
        .filter_map(|reservation| child(reservation, "instancesSet"))
        .flat_map(|set| children(set, "item"))
        .map(|instance| InstanceEntry {
            instance_id: text_of(child(instance, "instanceId")),
            state: text_of(child(instance, "instanceState").and_then(|state| child(state, "name"))),
            public_ip: text_of(child(instance, "ipAddress")),
        })
        .collect()
}

/// Error code and message from an error response.
pub(crate) fn api_error(doc: &Document<'_>) -> Option<(String, String)> {
    let error = first_descendant(doc, "Error")?;
    Some((
        text_of(child(error, "Code")),
        text_of(child(error, "Message")),
    ))
}
