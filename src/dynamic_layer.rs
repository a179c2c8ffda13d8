//! Per-sublayer override records and the set that manages them.
//!
//! A dynamic map service draws its sublayers with server-side rules. Clients
//! override those rules per sublayer through the `dynamicLayers` export
//! parameter: visibility, a definition expression, a renderer, labeling and
//! time options. [`DynamicLayerSet`] owns the ordered collection of override
//! records, guarantees ids stay unique, and re-establishes the completeness
//! invariant (every currently visible sublayer has a record) before every
//! serialization.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::filter::{self, LayerFilter};

/// Reference to the service sublayer a dynamic layer draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LayerSource {
    /// A sublayer of the map service itself.
    #[serde(rename_all = "camelCase")]
    MapLayer {
        /// Id of the sublayer.
        map_layer_id: u32,
    },
}

/// Server-side drawing rules of one sublayer.
///
/// Fields are independent: a renderer set earlier must survive a later
/// labeling change, which is why updates go through a shallow merge rather
/// than replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingInfo {
    /// Renderer definition in ArcGIS JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<Value>,
    /// Label classes in ArcGIS JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labeling_info: Option<Vec<Value>>,
    /// Layer transparency, 0 to 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<f64>,
}

impl DrawingInfo {
    /// Overwrites only the fields present in `patch`, preserving siblings.
    fn merge(&mut self, patch: DrawingInfo) {
        if let Some(renderer) = patch.renderer {
            self.renderer = Some(renderer);
        }
        if let Some(labeling_info) = patch.labeling_info {
            self.labeling_info = Some(labeling_info);
        }
        if let Some(transparency) = patch.transparency {
            self.transparency = Some(transparency);
        }
    }
}

/// One sublayer override record.
///
/// On the wire the `visible` field is spelled `visibility`; the serde rename
/// keeps the Rust name aligned with the rest of the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicLayer {
    /// Sublayer id. Unique within one set.
    pub id: u32,
    /// Source reference. Defaults to the sublayer with the same id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<LayerSource>,
    /// SQL filter applied to the sublayer's features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_expression: Option<String>,
    /// Drawing rule overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawing_info: Option<DrawingInfo>,
    /// Sublayer visibility.
    #[serde(rename = "visibility", skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// Time options in ArcGIS JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_time_options: Option<Value>,
}

impl DynamicLayer {
    /// Creates an override record for the given sublayer.
    pub fn for_sublayer(id: u32) -> Self {
        Self {
            id,
            source: Some(LayerSource::MapLayer { map_layer_id: id }),
            definition_expression: None,
            drawing_info: None,
            visible: None,
            layer_time_options: None,
        }
    }

    fn drawing_info_mut(&mut self) -> &mut DrawingInfo {
        self.drawing_info.get_or_insert_with(DrawingInfo::default)
    }
}

/// The default label class synthesized when labels are switched on for a
/// sublayer that has no labeling configured yet.
fn default_label_class() -> Value {
    json!({
        "labelExpression": "[OBJECTID]",
        "symbol": {
            "type": "esriTS",
            "color": [255, 255, 255, 255],
            "haloColor": [0, 0, 0, 255],
            "haloSize": 1,
            "font": {"size": 9},
        },
        "minScale": 0,
        "maxScale": 0,
    })
}

/// A single mutation for [`DynamicLayerSet::apply_batch`].
#[derive(Debug, Clone)]
pub enum DynamicLayerOp {
    /// Sets sublayer visibility.
    Visibility {
        /// Sublayer id.
        id: u32,
        /// New visibility.
        visible: bool,
    },
    /// Sets the definition expression.
    Definition {
        /// Sublayer id.
        id: u32,
        /// Raw SQL expression.
        expression: String,
    },
    /// Sets the definition expression from a typed filter.
    Filter {
        /// Sublayer id.
        id: u32,
        /// Filter to compile.
        filter: LayerFilter,
    },
    /// Sets the renderer.
    Renderer {
        /// Sublayer id.
        id: u32,
        /// Renderer definition.
        renderer: Value,
    },
    /// Merges drawing info fields.
    DrawingInfo {
        /// Sublayer id.
        id: u32,
        /// Fields to overwrite.
        patch: DrawingInfo,
    },
    /// Replaces the labeling with one label class.
    Labels {
        /// Sublayer id.
        id: u32,
        /// Label class definition.
        label: Value,
    },
    /// Shows or hides labels.
    LabelsVisible {
        /// Sublayer id.
        id: u32,
        /// New label visibility.
        visible: bool,
    },
    /// Sets the sublayer time options.
    TimeOptions {
        /// Sublayer id.
        id: u32,
        /// Time options in ArcGIS JSON.
        options: Value,
    },
}

/// Ordered collection of sublayer overrides with transaction support.
///
/// Mutations target the live collection, or the staging buffer while a
/// transaction is open. The renderer only ever sees committed state:
/// [`DynamicLayerSet::to_wire`] serializes the live collection.
#[derive(Debug, Clone, Default)]
pub struct DynamicLayerSet {
    live: Vec<DynamicLayer>,
    staged: Option<Vec<DynamicLayer>>,
}

impl DynamicLayerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from existing override records. Records with duplicate
    /// ids collapse, last write wins.
    pub fn from_layers(layers: Vec<DynamicLayer>) -> Self {
        let mut set = Self::new();
        set.replace(layers);
        set
    }

    /// Replaces the whole collection. Duplicate ids collapse, last wins.
    pub fn replace(&mut self, layers: Vec<DynamicLayer>) {
        let target = self.target_mut();
        target.clear();
        for layer in layers {
            match target.iter().position(|existing| existing.id == layer.id) {
                Some(index) => target[index] = layer,
                None => target.push(layer),
            }
        }
    }

    /// The committed override records.
    pub fn layers(&self) -> &[DynamicLayer] {
        &self.live
    }

    /// Whether the committed collection is empty.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// The committed record for a sublayer, if present.
    pub fn get(&self, id: u32) -> Option<&DynamicLayer> {
        self.live.iter().find(|layer| layer.id == id)
    }

    fn target_mut(&mut self) -> &mut Vec<DynamicLayer> {
        self.staged.as_mut().unwrap_or(&mut self.live)
    }

    fn entry(&mut self, id: u32) -> &mut DynamicLayer {
        let target = self.target_mut();
        if let Some(position) = target.iter().position(|layer| layer.id == id) {
            &mut target[position]
        } else {
            target.push(DynamicLayer::for_sublayer(id));
            target.last_mut().expect("just pushed")
        }
    }

    /// Sets sublayer visibility.
    pub fn set_visibility(&mut self, id: u32, visible: bool) {
        self.entry(id).visible = Some(visible);
    }

    /// Sets the definition expression.
    pub fn set_definition(&mut self, id: u32, expression: impl Into<String>) {
        self.entry(id).definition_expression = Some(expression.into());
    }

    /// Compiles the filter and sets it as the definition expression.
    ///
    /// A filter that compiles to no constraint leaves the record untouched.
    pub fn set_filter(&mut self, id: u32, filter: &LayerFilter) {
        if let Some(expression) = filter::compile(filter) {
            self.set_definition(id, expression);
        }
    }

    /// Sets the renderer, preserving any configured labeling.
    pub fn set_renderer(&mut self, id: u32, renderer: Value) {
        self.entry(id).drawing_info_mut().renderer = Some(renderer);
    }

    /// Shallow-merges drawing info fields into the record. Fields absent from
    /// the patch keep their current values.
    pub fn set_drawing_info(&mut self, id: u32, patch: DrawingInfo) {
        self.entry(id).drawing_info_mut().merge(patch);
    }

    /// Replaces the sublayer labeling with a single label class.
    pub fn set_labels(&mut self, id: u32, label: Value) {
        self.entry(id).drawing_info_mut().labeling_info = Some(vec![label]);
    }

    /// Shows or hides sublayer labels.
    ///
    /// Hiding removes the labeling configuration entirely. Showing labels on a
    /// sublayer with no labeling synthesizes a default class that labels
    /// features with their object id.
    pub fn set_labels_visible(&mut self, id: u32, visible: bool) {
        let drawing_info = self.entry(id).drawing_info_mut();
        if visible {
            if drawing_info.labeling_info.is_none() {
                drawing_info.labeling_info = Some(vec![default_label_class()]);
            }
        } else {
            drawing_info.labeling_info = None;
        }
    }

    /// Sets the sublayer time options.
    pub fn set_time_options(&mut self, id: u32, options: Value) {
        self.entry(id).layer_time_options = Some(options);
    }

    /// Applies mutations in list order; for the same id and field the last
    /// one wins.
    pub fn apply_batch(&mut self, ops: Vec<DynamicLayerOp>) {
        for op in ops {
            match op {
                DynamicLayerOp::Visibility { id, visible } => self.set_visibility(id, visible),
                DynamicLayerOp::Definition { id, expression } => {
                    self.set_definition(id, expression)
                }
                DynamicLayerOp::Filter { id, filter } => self.set_filter(id, &filter),
                DynamicLayerOp::Renderer { id, renderer } => self.set_renderer(id, renderer),
                DynamicLayerOp::DrawingInfo { id, patch } => self.set_drawing_info(id, patch),
                DynamicLayerOp::Labels { id, label } => self.set_labels(id, label),
                DynamicLayerOp::LabelsVisible { id, visible } => {
                    self.set_labels_visible(id, visible)
                }
                DynamicLayerOp::TimeOptions { id, options } => self.set_time_options(id, options),
            }
        }
    }

    /// Appends `{id, visible: true}` records for visible sublayers missing
    /// from the set.
    ///
    /// The set is not a pure cache of explicit overrides: once serialized it
    /// replaces the server's own sublayer list, so every visible sublayer must
    /// be present or it would disappear from the map. Existing records are
    /// never modified.
    pub fn ensure_visible_layers_present(&mut self, visible_ids: &[u32]) {
        for &id in visible_ids {
            let target = self.target_mut();
            if !target.iter().any(|layer| layer.id == id) {
                let mut layer = DynamicLayer::for_sublayer(id);
                layer.visible = Some(true);
                target.push(layer);
            }
        }
    }

    /// Opens a transaction, snapshotting current state into a staging buffer.
    ///
    /// Calling `begin` while a transaction is already open silently restarts
    /// it, discarding the staged changes.
    pub fn begin(&mut self) {
        self.staged = Some(self.live.clone());
    }

    /// Promotes the staging buffer, re-establishing the completeness
    /// invariant for the given visible sublayers. Returns whether a
    /// transaction was open.
    pub fn commit(&mut self, visible_ids: &[u32]) -> bool {
        match self.staged.take() {
            Some(staged) => {
                self.live = staged;
                self.ensure_visible_layers_present(visible_ids);
                true
            }
            None => false,
        }
    }

    /// Discards the staging buffer. Returns whether a transaction was open.
    pub fn rollback(&mut self) -> bool {
        self.staged.take().is_some()
    }

    /// Whether a transaction is open.
    pub fn is_in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// The serializable form of the set: committed records completed with
    /// `{id, visible: true}` entries for the given visible sublayers.
    pub fn to_wire(&self, visible_ids: &[u32]) -> Vec<DynamicLayer> {
        let mut wire = Self {
            live: self.live.clone(),
            staged: None,
        };
        wire.ensure_visible_layers_present(visible_ids);
        wire.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_adds_exactly_the_missing_visible_ids() {
        let mut set = DynamicLayerSet::new();
        set.set_visibility(1, false);
        set.set_definition(3, "POP > 100");
        let before: Vec<DynamicLayer> = set.layers().to_vec();

        set.ensure_visible_layers_present(&[1, 2, 3, 4]);

        let ids: Vec<u32> = set.layers().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 3, 2, 4]);
        // Originals are preserved unchanged.
        assert_eq!(&set.layers()[..2], &before[..]);
        // Synthesized entries are visible.
        assert_eq!(set.get(2).and_then(|l| l.visible), Some(true));
        assert_eq!(set.get(4).and_then(|l| l.visible), Some(true));
    }

    #[test]
    fn renderer_and_labels_coexist_after_independent_calls() {
        let renderer = json!({"type": "simple", "symbol": {"type": "esriSFS"}});
        let label = json!({"labelExpression": "[NAME]"});

        let mut set = DynamicLayerSet::new();
        set.set_renderer(2, renderer.clone());
        set.set_labels(2, label.clone());

        let drawing_info = set.get(2).and_then(|l| l.drawing_info.clone()).expect("set");
        assert_eq!(drawing_info.renderer, Some(renderer));
        assert_eq!(drawing_info.labeling_info, Some(vec![label]));
    }

    #[test]
    fn drawing_info_merge_preserves_siblings() {
        let renderer = json!({"type": "simple"});
        let mut set = DynamicLayerSet::new();
        set.set_renderer(0, renderer.clone());
        set.set_drawing_info(
            0,
            DrawingInfo {
                transparency: Some(50.0),
                ..Default::default()
            },
        );

        let drawing_info = set.get(0).and_then(|l| l.drawing_info.clone()).expect("set");
        assert_eq!(drawing_info.renderer, Some(renderer));
        assert_eq!(drawing_info.transparency, Some(50.0));
    }

    #[test]
    fn set_labels_replaces_prior_labeling() {
        let mut set = DynamicLayerSet::new();
        set.set_labels(1, json!({"labelExpression": "[A]"}));
        set.set_labels(1, json!({"labelExpression": "[B]"}));

        let labeling = set
            .get(1)
            .and_then(|l| l.drawing_info.as_ref())
            .and_then(|d| d.labeling_info.clone())
            .expect("set");
        assert_eq!(labeling, vec![json!({"labelExpression": "[B]"})]);
    }

    #[test]
    fn labels_visible_false_removes_labeling() {
        let mut set = DynamicLayerSet::new();
        set.set_labels(1, json!({"labelExpression": "[A]"}));
        set.set_labels_visible(1, false);

        let drawing_info = set.get(1).and_then(|l| l.drawing_info.clone()).expect("set");
        assert_eq!(drawing_info.labeling_info, None);
    }

    #[test]
    fn labels_visible_true_synthesizes_objectid_labels() {
        let mut set = DynamicLayerSet::new();
        set.set_labels_visible(5, true);

        let labeling = set
            .get(5)
            .and_then(|l| l.drawing_info.as_ref())
            .and_then(|d| d.labeling_info.clone())
            .expect("synthesized");
        assert_eq!(labeling.len(), 1);
        assert_eq!(labeling[0]["labelExpression"], "[OBJECTID]");
    }

    #[test]
    fn labels_visible_true_keeps_existing_labeling() {
        let label = json!({"labelExpression": "[NAME]"});
        let mut set = DynamicLayerSet::new();
        set.set_labels(5, label.clone());
        set.set_labels_visible(5, true);

        let labeling = set
            .get(5)
            .and_then(|l| l.drawing_info.as_ref())
            .and_then(|d| d.labeling_info.clone())
            .expect("kept");
        assert_eq!(labeling, vec![label]);
    }

    #[test]
    fn filter_compiling_to_none_is_a_no_op() {
        let mut set = DynamicLayerSet::new();
        set.set_definition(1, "POP > 100");
        set.set_filter(1, &LayerFilter::all(vec![]));

        assert_eq!(
            set.get(1).and_then(|l| l.definition_expression.clone()),
            Some("POP > 100".to_string())
        );
    }

    #[test]
    fn batch_applies_in_order_last_wins() {
        let mut set = DynamicLayerSet::new();
        set.apply_batch(vec![
            DynamicLayerOp::Visibility {
                id: 1,
                visible: true,
            },
            DynamicLayerOp::Definition {
                id: 1,
                expression: "A = 1".into(),
            },
            DynamicLayerOp::Visibility {
                id: 1,
                visible: false,
            },
        ]);

        let layer = set.get(1).expect("created");
        assert_eq!(layer.visible, Some(false));
        assert_eq!(layer.definition_expression.as_deref(), Some("A = 1"));
    }

    #[test]
    fn visible_serializes_as_visibility() {
        let mut set = DynamicLayerSet::new();
        set.set_visibility(7, true);

        let wire = serde_json::to_value(set.to_wire(&[])).expect("serializable");
        assert_eq!(wire[0]["id"], 7);
        assert_eq!(wire[0]["visibility"], true);
        assert!(wire[0].get("visible").is_none());
        assert_eq!(wire[0]["source"]["type"], "mapLayer");
        assert_eq!(wire[0]["source"]["mapLayerId"], 7);
    }

    #[test]
    fn rollback_discards_staged_mutations() {
        let mut set = DynamicLayerSet::new();
        set.set_visibility(1, true);
        let before = set.layers().to_vec();

        set.begin();
        set.set_visibility(1, false);
        set.set_definition(2, "A = 1");
        assert!(set.is_in_transaction());
        assert!(set.rollback());

        assert_eq!(set.layers(), &before[..]);
        assert!(!set.is_in_transaction());
    }

    #[test]
    fn commit_promotes_staged_mutations_and_ensures_completeness() {
        let mut set = DynamicLayerSet::new();
        set.begin();
        set.set_visibility(1, false);
        assert!(set.commit(&[0, 1]));

        assert_eq!(set.get(1).and_then(|l| l.visible), Some(false));
        assert_eq!(set.get(0).and_then(|l| l.visible), Some(true));
        assert!(!set.is_in_transaction());
        // Committing again without a transaction reports no-op.
        assert!(!set.commit(&[0, 1]));
    }

    #[test]
    fn mutations_during_transaction_do_not_touch_live_state() {
        let mut set = DynamicLayerSet::new();
        set.set_visibility(1, true);

        set.begin();
        set.set_visibility(1, false);
        assert_eq!(set.get(1).and_then(|l| l.visible), Some(true));
        assert_eq!(set.to_wire(&[])[0].visible, Some(true));
        set.rollback();
    }

    #[test]
    fn nested_begin_restarts_the_transaction() {
        let mut set = DynamicLayerSet::new();
        set.begin();
        set.set_visibility(1, false);
        set.begin();
        assert!(set.commit(&[]));

        // The first staged mutation was discarded by the second begin.
        assert!(set.get(1).is_none());
    }

    #[test]
    fn replace_collapses_duplicate_ids_last_wins() {
        let mut first = DynamicLayer::for_sublayer(1);
        first.visible = Some(true);
        let mut second = DynamicLayer::for_sublayer(1);
        second.visible = Some(false);

        let set = DynamicLayerSet::from_layers(vec![first, second]);
        assert_eq!(set.layers().len(), 1);
        assert_eq!(set.get(1).and_then(|l| l.visible), Some(false));
    }
}
