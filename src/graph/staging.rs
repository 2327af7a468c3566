//! Staging transfers and weight prepacking.
//!
//! Both directions of a host/device copy are a single conversion dispatch
//! over the device tensor: one invocation per texel (or element for linear
//! storage), with two uniforms describing the padded device sizes and the
//! logical sizes so the shader can skip padding.
//!
//! Prepacking is the same upload, recorded on the prepack list instead of the
//! execute list because its source is constant. Each source is prepacked at
//! most once per graph.
//!
//! # Example
//!
//! ```rust
//! use briny_rt::graph::{ComputeGraph, TensorRef};
//! use briny_rt::graph::staging::prepack_if_needed;
//!
//! let mut graph = ComputeGraph::default();
//! let w = graph.add_tensor_ref(TensorRef::from_slice(&[2, 8], &[0.5f32; 16]));
//! let packed = prepack_if_needed(&mut graph, w, None)?;
//! assert_eq!(prepack_if_needed(&mut graph, w, None)?, packed);
//! assert_eq!(graph.prepack_nodes().len(), 1);
//! # Ok::<(), briny_rt::error::GraphError>(())
//! ```

use crate::error::GraphError;
use crate::graph::node::{AccessMode, Binding, DispatchSize, ExecuteNode, PrepackNode, ShaderInfo};
use crate::graph::tensor::{MemoryLayout, ParamsBuffer};
use crate::graph::workgroup::adaptive_work_group_size_with_limit;
use crate::graph::{ComputeGraph, NodeId, ValueRef};

#[derive(Clone, Copy)]
enum Direction {
    Upload,
    Download,
}

/// Shader, geometry and uniforms of a conversion dispatch over `tensor`.
fn conversion_plan(
    graph: &ComputeGraph,
    tensor: ValueRef,
    direction: Direction,
) -> (ShaderInfo, DispatchSize, Vec<ParamsBuffer>) {
    let t = graph.get_tensor(tensor);
    let shader = match direction {
        Direction::Upload => graph.shaders().shader_for_upload(t),
        Direction::Download => graph.shaders().shader_for_download(t),
    };
    let global = t.extents();
    let local = adaptive_work_group_size_with_limit(global, graph.config().max_workgroup_invocations);
    (
        shader,
        DispatchSize { global, local },
        vec![t.gpu_sizes_ubo(), t.cpu_sizes_ubo()],
    )
}

/// Appends an execute node copying `staging` into `tensor`.
///
/// # Panics
/// If `staging` is not a staging buffer or `tensor` is not a device tensor.
pub fn add_staging_to_tensor_node(
    graph: &mut ComputeGraph,
    staging: ValueRef,
    tensor: ValueRef,
) -> NodeId {
    assert!(
        graph.val_is_staging(staging),
        "value {} is not a staging buffer",
        staging.0
    );
    let (shader, dispatch, params) = conversion_plan(graph, tensor, Direction::Upload);
    log::debug!(
        "execute node: {} global {:?} local {:?}",
        shader.name,
        dispatch.global,
        dispatch.local
    );
    graph.push_execute(ExecuteNode {
        shader,
        dispatch,
        bindings: vec![
            Binding::new(tensor, AccessMode::Write),
            Binding::new(staging, AccessMode::Read),
        ],
        params,
    })
}

/// Appends an execute node copying `tensor` into `staging`.
///
/// # Panics
/// If `staging` is not a staging buffer or `tensor` is not a device tensor.
pub fn add_tensor_to_staging_node(
    graph: &mut ComputeGraph,
    tensor: ValueRef,
    staging: ValueRef,
) -> NodeId {
    assert!(
        graph.val_is_staging(staging),
        "value {} is not a staging buffer",
        staging.0
    );
    let (shader, dispatch, params) = conversion_plan(graph, tensor, Direction::Download);
    log::debug!(
        "execute node: {} global {:?} local {:?}",
        shader.name,
        dispatch.global,
        dispatch.local
    );
    graph.push_execute(ExecuteNode {
        shader,
        dispatch,
        bindings: vec![
            Binding::new(tensor, AccessMode::Read),
            Binding::new(staging, AccessMode::Write),
        ],
        params,
    })
}

/// Uploads the constant `source` into a new device tensor under `layout`.
///
/// Repeated calls for the same source return the tensor created by the
/// first one.
///
/// # Errors
/// - [`GraphError::NotATensorRef`] if `source` holds no constant data
/// - [`GraphError::ConflictingLayout`] if `source` was already prepacked
///   under another layout
/// - [`GraphError::UnsupportedRank`] if the source cannot be an image
///
/// Nothing is appended on error.
pub fn prepack(
    graph: &mut ComputeGraph,
    source: ValueRef,
    layout: MemoryLayout,
) -> Result<ValueRef, GraphError> {
    if !graph.val_is_tref(source) {
        return Err(GraphError::NotATensorRef(source.0));
    }
    if let Some(packed) = graph.prepacked(source) {
        let existing = graph.get_tensor(packed).layout();
        if existing != layout {
            return Err(GraphError::ConflictingLayout {
                value: source.0,
                existing,
                requested: layout,
            });
        }
        log::trace!("prepack of value {} reused as {}", source.0, packed.0);
        return Ok(packed);
    }

    let packed = graph.add_tensor_like(source, layout)?;
    let (shader, dispatch, params) = conversion_plan(graph, packed, Direction::Upload);
    log::debug!(
        "prepack node: value {} -> {} via {} global {:?}",
        source.0,
        packed.0,
        shader.name,
        dispatch.global
    );
    graph.push_prepack(PrepackNode {
        shader,
        dispatch,
        source,
        packed,
        params,
    });
    graph.record_prepack(source, packed);
    Ok(packed)
}

/// Returns `value` unchanged unless it is a tensor ref, in which case it is
/// prepacked under `layout`, or the suggested layout for its sizes.
///
/// # Errors
/// As for [`prepack`].
pub fn prepack_if_needed(
    graph: &mut ComputeGraph,
    value: ValueRef,
    layout: Option<MemoryLayout>,
) -> Result<ValueRef, GraphError> {
    let Some(tref) = graph.get_tref(value) else {
        return Ok(value);
    };
    let layout = match layout {
        Some(layout) => layout,
        None => match graph.prepacked(value) {
            Some(packed) => {
                log::trace!("prepack of value {} reused as {}", value.0, packed.0);
                return Ok(packed);
            }
            None => graph.suggested_memory_layout(&tref.sizes),
        },
    };
    prepack(graph, value, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StorageKind;
    use crate::graph::tensor::TensorRef;
    use crate::tensors::DType;

    #[test]
    #[should_panic(expected = "not a staging buffer")]
    fn upload_requires_staging() {
        let mut g = ComputeGraph::default();
        let a = g
            .add_tensor(&[4], DType::F32, StorageKind::DeviceImage, MemoryLayout::WidthPacked)
            .unwrap();
        let b = g
            .add_tensor(&[4], DType::F32, StorageKind::DeviceImage, MemoryLayout::WidthPacked)
            .unwrap();
        add_staging_to_tensor_node(&mut g, a, b);
    }

    #[test]
    fn non_refs_pass_through() {
        let mut g = ComputeGraph::default();
        let t = g
            .add_tensor(&[4], DType::F32, StorageKind::DeviceBuffer, MemoryLayout::WidthPacked)
            .unwrap();
        assert_eq!(prepack_if_needed(&mut g, t, None), Ok(t));
        assert!(g.prepack_nodes().is_empty());
        assert_eq!(prepack(&mut g, t, MemoryLayout::WidthPacked), Err(GraphError::NotATensorRef(t.0)));
    }

    #[test]
    fn conflicting_layout_appends_nothing() {
        let mut g = ComputeGraph::default();
        let w = g.add_tensor_ref(TensorRef::from_slice(&[4, 4], &[1i32; 16]));
        prepack(&mut g, w, MemoryLayout::WidthPacked).unwrap();
        let before = g.values().len();
        let err = prepack(&mut g, w, MemoryLayout::ChannelsPacked).unwrap_err();
        assert!(matches!(err, GraphError::ConflictingLayout { .. }));
        assert_eq!(g.values().len(), before);
        assert_eq!(g.prepack_nodes().len(), 1);
    }
}
