//! Derives a reference's primitive kind from the fields component C already
//! carries, instead of threading a parallel array through the build.

use bvh_refs::{PrimitiveRef, NO_SEGMENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimKind {
    Triangle,
    CurveSegment,
    Object,
}

pub fn classify(reference: &PrimitiveRef) -> PrimKind {
    if reference.is_object_reference() {
        PrimKind::Object
    } else if reference.segment_id != NO_SEGMENT {
        PrimKind::CurveSegment
    } else {
        PrimKind::Triangle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bvh_bounds::Aabb;
    use bvh_refs::OBJECT_REFERENCE;

    fn base_ref() -> PrimitiveRef {
        PrimitiveRef {
            object_id: 0,
            primitive_id: 0,
            segment_id: NO_SEGMENT,
            bounds: Aabb::empty(),
            time_from: 0.0,
            time_to: 1.0,
            visibility: 1,
        }
    }

    #[test]
    fn classifies_object_references_by_sentinel_primitive_id() {
        let mut r = base_ref();
        r.primitive_id = OBJECT_REFERENCE;
        assert_eq!(classify(&r), PrimKind::Object);
    }

    #[test]
    fn classifies_curve_segments_by_non_sentinel_segment_id() {
        let mut r = base_ref();
        r.segment_id = 2;
        assert_eq!(classify(&r), PrimKind::CurveSegment);
    }

    #[test]
    fn classifies_plain_references_as_triangles() {
        assert_eq!(classify(&base_ref()), PrimKind::Triangle);
    }
}
