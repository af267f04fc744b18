//! Cast scope, cast checks and shape resolution
//!
//! Everything here evaluates expressions against a read-only
//! [`CastScope`]; nothing mutates members.

use super::geometry::{ResolvedShape, Vec2};
use super::types::{
    CastRejection, MotionDef, ShapeDef, ShapeKind, ShapeOperation, SkillEffectDescriptor,
    SpatialRef, TimelineEntry,
};
use super::SkillError;
use crate::expr::{parse, ExpressionCache, Scope};
use crate::pipeline::TransformSpec;

// ============================================================================
// SCOPE
// ============================================================================

/// Variables visible to skill expressions
///
/// - bare names and `self.*` / `caster.*`: caster attributes
/// - `target.*`: target attributes (read-only)
/// - `caster.x`, `caster.y`, `target.x`, `target.y`, `distance`
/// - `frame` (absolute) and `elapsed` (frames since the cast started)
pub struct CastScope<'a> {
    pub caster: &'a dyn Scope,
    pub target: Option<&'a dyn Scope>,
    pub caster_pos: Vec2,
    pub target_pos: Option<Vec2>,
    pub frame: u64,
    pub elapsed: u64,
}

impl CastScope<'_> {
    pub fn distance(&self) -> Option<f64> {
        self.target_pos.map(|p| self.caster_pos.distance(p))
    }

    /// Heading from caster to target in radians (0 without a target)
    pub fn facing(&self) -> f64 {
        match self.target_pos {
            Some(p) if p != self.caster_pos => (p - self.caster_pos).angle(),
            _ => 0.0,
        }
    }
}

impl Scope for CastScope<'_> {
    fn lookup(&self, name: &str) -> Option<f64> {
        match name {
            "caster.x" | "self.x" => Some(self.caster_pos.x),
            "caster.y" | "self.y" => Some(self.caster_pos.y),
            "target.x" => self.target_pos.map(|p| p.x),
            "target.y" => self.target_pos.map(|p| p.y),
            "distance" => self.distance(),
            "frame" => Some(self.frame as f64),
            "elapsed" => Some(self.elapsed as f64),
            _ => {
                if let Some(rest) = name.strip_prefix("target.") {
                    self.target?.lookup(rest)
                } else if let Some(rest) = name
                    .strip_prefix("self.")
                    .or_else(|| name.strip_prefix("caster."))
                {
                    self.caster.lookup(rest)
                } else {
                    self.caster.lookup(name)
                }
            }
        }
    }
}

// ============================================================================
// CAST CHECKS
// ============================================================================

/// Disable condition, condition and range, in that order
///
/// Costs are checked by the caller through the `skill_cost` pipeline.
pub fn check_cast(
    skill: &SkillEffectDescriptor,
    scope: &CastScope<'_>,
    cache: &mut ExpressionCache,
) -> Result<(), CastRejection> {
    if let Some(disable) = &skill.disable_condition {
        if cache.evaluate_condition(disable, scope) {
            return Err(CastRejection::Disabled);
        }
    }
    if !cache.evaluate_condition(&skill.condition, scope) {
        return Err(CastRejection::ConditionFailed);
    }
    if let Some(range_expr) = &skill.casting_range {
        let range = cache.evaluate_or(range_expr, scope, 0.0);
        let distance = scope.distance().ok_or(CastRejection::MissingTarget)?;
        if distance > range {
            return Err(CastRejection::OutOfRange { distance, range });
        }
    }
    Ok(())
}

// ============================================================================
// SHAPES
// ============================================================================

fn resolve_ref(r: &SpatialRef, scope: &CastScope<'_>, cache: &mut ExpressionCache) -> Vec2 {
    match r {
        SpatialRef::Caster => scope.caster_pos,
        SpatialRef::Target => scope.target_pos.unwrap_or(scope.caster_pos),
        SpatialRef::Point { x, y } => Vec2::new(
            cache.evaluate_or(x, scope, 0.0),
            cache.evaluate_or(y, scope, 0.0),
        ),
    }
}

fn degrees(
    expr: Option<&String>,
    scope: &CastScope<'_>,
    cache: &mut ExpressionCache,
) -> f64 {
    match expr {
        Some(e) => cache.evaluate_or(e, scope, 0.0).to_radians(),
        None => scope.facing(),
    }
}

/// Evaluate a shape at the scope's current frame
///
/// Failing parameter expressions resolve to 0.
pub fn resolve_shape(
    def: &ShapeDef,
    scope: &CastScope<'_>,
    cache: &mut ExpressionCache,
) -> ResolvedShape {
    let center = resolve_ref(&def.center, scope, cache);
    let mut eval = |e: &str| cache.evaluate_or(e, scope, 0.0).max(0.0);

    let shape = match &def.kind {
        ShapeKind::Circle { radius } => ResolvedShape::Circle {
            center,
            radius: eval(radius),
        },
        ShapeKind::Sector {
            radius,
            angle,
            direction,
        } => {
            let radius = eval(radius);
            let half_angle = eval(angle).to_radians() / 2.0;
            ResolvedShape::Sector {
                center,
                radius,
                half_angle,
                direction: degrees(direction.as_ref(), scope, cache),
            }
        }
        ShapeKind::Rectangle {
            width,
            length,
            rotation,
        } => {
            let width = eval(width);
            let length = eval(length);
            ResolvedShape::Rectangle {
                center,
                width,
                length,
                rotation: degrees(rotation.as_ref(), scope, cache),
            }
        }
        ShapeKind::Annulus {
            inner_radius,
            outer_radius,
        } => ResolvedShape::Annulus {
            center,
            inner_radius: eval(inner_radius),
            outer_radius: eval(outer_radius),
        },
    };

    def.operations
        .iter()
        .fold(shape, |shape, ShapeOperation::Motion { motion }| {
            let to = motion_center(motion, scope, cache);
            shape.with_center(to)
        })
}

/// Center position a motion yields at `scope.elapsed`
fn motion_center(motion: &MotionDef, scope: &CastScope<'_>, cache: &mut ExpressionCache) -> Vec2 {
    match motion {
        MotionDef::Follow { reference } => resolve_ref(reference, scope, cache),
        MotionDef::Linear {
            from,
            to,
            duration,
            speed,
        } => {
            let start = resolve_ref(from, scope, cache);
            let end = resolve_ref(to, scope, cache);
            let frames = match (duration, speed) {
                (Some(d), _) => cache.evaluate_or(d, scope, 0.0).max(0.0),
                (None, Some(s)) => {
                    let speed = cache.evaluate_or(s, scope, 0.0);
                    if speed > 0.0 {
                        (start.distance(end) / speed).ceil()
                    } else {
                        0.0
                    }
                }
                (None, None) => 0.0,
            };
            let t = if frames <= 0.0 {
                1.0
            } else {
                scope.elapsed as f64 / frames
            };
            start.lerp(end, t)
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

fn ref_expressions<'a>(label: &str, r: &'a SpatialRef, out: &mut Vec<(String, &'a str)>) {
    if let SpatialRef::Point { x, y } = r {
        out.push((format!("{label}.x"), x.as_str()));
        out.push((format!("{label}.y"), y.as_str()));
    }
}

/// Every expression in a descriptor, labelled by where it appears
fn expressions(skill: &SkillEffectDescriptor) -> Vec<(String, &str)> {
    let mut out: Vec<(String, &str)> = vec![
        ("condition".to_string(), skill.condition.as_str()),
        ("hpCost".to_string(), skill.hp_cost.as_str()),
        ("mpCost".to_string(), skill.mp_cost.as_str()),
    ];
    if let Some(range) = &skill.casting_range {
        out.push(("castingRange".to_string(), range.as_str()));
    }
    if let Some(disable) = &skill.disable_condition {
        out.push(("disableCondition".to_string(), disable.as_str()));
    }

    let shape = &skill.effect_scope.shape;
    ref_expressions("shape.center", &shape.center, &mut out);
    match &shape.kind {
        ShapeKind::Circle { radius } => out.push(("shape.radius".to_string(), radius.as_str())),
        ShapeKind::Sector {
            radius,
            angle,
            direction,
        } => {
            out.push(("shape.radius".to_string(), radius.as_str()));
            out.push(("shape.angle".to_string(), angle.as_str()));
            if let Some(d) = direction {
                out.push(("shape.direction".to_string(), d.as_str()));
            }
        }
        ShapeKind::Rectangle {
            width,
            length,
            rotation,
        } => {
            out.push(("shape.width".to_string(), width.as_str()));
            out.push(("shape.length".to_string(), length.as_str()));
            if let Some(r) = rotation {
                out.push(("shape.rotation".to_string(), r.as_str()));
            }
        }
        ShapeKind::Annulus {
            inner_radius,
            outer_radius,
        } => {
            out.push(("shape.innerRadius".to_string(), inner_radius.as_str()));
            out.push(("shape.outerRadius".to_string(), outer_radius.as_str()));
        }
    }
    for (i, ShapeOperation::Motion { motion }) in shape.operations.iter().enumerate() {
        let label = format!("shape.operations[{i}]");
        match motion {
            MotionDef::Linear {
                from,
                to,
                duration,
                speed,
            } => {
                ref_expressions(&format!("{label}.from"), from, &mut out);
                ref_expressions(&format!("{label}.to"), to, &mut out);
                if let Some(d) = duration {
                    out.push((format!("{label}.duration"), d.as_str()));
                }
                if let Some(s) = speed {
                    out.push((format!("{label}.speed"), s.as_str()));
                }
            }
            MotionDef::Follow { reference } => {
                ref_expressions(&format!("{label}.reference"), reference, &mut out);
            }
        }
    }

    for (i, entry) in skill.timeline.iter().enumerate() {
        match entry {
            TimelineEntry::Damage(d) => {
                out.push((format!("timeline[{i}].damage"), d.damage.as_str()));
            }
            TimelineEntry::Buff(b) => {
                if let Some(tick) = &b.on_tick {
                    out.push((format!("timeline[{i}].onTick"), tick.as_str()));
                }
                for (h, hook) in b.hooks.iter().enumerate() {
                    if let TransformSpec::Formula { expr } = &hook.transform {
                        out.push((format!("timeline[{i}].hooks[{h}]"), expr.as_str()));
                    }
                }
            }
        }
    }
    out
}

/// Check that every expression parses and every interval is positive
pub fn validate_descriptor(skill: &SkillEffectDescriptor) -> Result<(), SkillError> {
    for (field, source) in expressions(skill) {
        parse(source).map_err(|source| SkillError::InvalidExpression {
            skill: skill.id.clone(),
            field,
            source,
        })?;
    }

    let invalid = |message: &str| SkillError::InvalidDescriptor {
        skill: skill.id.clone(),
        message: message.to_string(),
    };
    if skill.effect_scope.update_interval == 0 {
        return Err(invalid("effectScope.updateInterval must be at least 1"));
    }
    for entry in &skill.timeline {
        if let TimelineEntry::Buff(b) = entry {
            if b.update_interval == 0 {
                return Err(invalid("buff updateInterval must be at least 1"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::MapScope;
    use std::f64::consts::PI;

    fn skill(json: &str) -> SkillEffectDescriptor {
        serde_json::from_str(json).unwrap()
    }

    fn fireball() -> SkillEffectDescriptor {
        skill(
            r#"{"id": "fireball", "condition": "mp.current >= 100",
                "mpCost": "100", "castingRange": "12",
                "disableCondition": "silenced",
                "timeline": [{"type": "damage", "damage": "atk + 50"}],
                "effectScope": {"type": "static", "duration": 1,
                    "shape": {"type": "circle", "radius": "3", "center": {"type": "target"}}}}"#,
        )
    }

    fn caster_stats(mp: f64, silenced: f64) -> MapScope {
        MapScope::new()
            .with("atk", 120.0)
            .with("mp.current", mp)
            .with("silenced", silenced)
    }

    fn scope<'a>(caster: &'a MapScope, target: &'a MapScope, target_x: f64) -> CastScope<'a> {
        CastScope {
            caster,
            target: Some(target),
            caster_pos: Vec2::ZERO,
            target_pos: Some(Vec2::new(target_x, 0.0)),
            frame: 100,
            elapsed: 0,
        }
    }

    #[test]
    fn test_cast_scope_lookup() {
        let caster = caster_stats(300.0, 0.0);
        let target = MapScope::new().with("def", 40.0);
        let s = scope(&caster, &target, 8.0);
        assert_eq!(s.lookup("atk"), Some(120.0));
        assert_eq!(s.lookup("self.atk"), Some(120.0));
        assert_eq!(s.lookup("target.def"), Some(40.0));
        assert_eq!(s.lookup("target.atk"), None);
        assert_eq!(s.lookup("distance"), Some(8.0));
        assert_eq!(s.lookup("target.x"), Some(8.0));
        assert_eq!(s.lookup("frame"), Some(100.0));
    }

    #[test]
    fn test_check_order() {
        let mut cache = ExpressionCache::new();
        let target = MapScope::new();
        let skill = fireball();

        // Disabled wins over everything else
        let caster = caster_stats(0.0, 1.0);
        assert_eq!(
            check_cast(&skill, &scope(&caster, &target, 50.0), &mut cache),
            Err(CastRejection::Disabled)
        );

        let caster = caster_stats(50.0, 0.0);
        assert_eq!(
            check_cast(&skill, &scope(&caster, &target, 50.0), &mut cache),
            Err(CastRejection::ConditionFailed)
        );

        let caster = caster_stats(300.0, 0.0);
        assert_eq!(
            check_cast(&skill, &scope(&caster, &target, 13.0), &mut cache),
            Err(CastRejection::OutOfRange {
                distance: 13.0,
                range: 12.0
            })
        );
        assert_eq!(check_cast(&skill, &scope(&caster, &target, 12.0), &mut cache), Ok(()));
    }

    #[test]
    fn test_ranged_skill_needs_target() {
        let mut cache = ExpressionCache::new();
        let caster = caster_stats(300.0, 0.0);
        let s = CastScope {
            caster: &caster,
            target: None,
            caster_pos: Vec2::ZERO,
            target_pos: None,
            frame: 0,
            elapsed: 0,
        };
        assert_eq!(
            check_cast(&fireball(), &s, &mut cache),
            Err(CastRejection::MissingTarget)
        );
    }

    #[test]
    fn test_circle_centered_on_target() {
        let mut cache = ExpressionCache::new();
        let caster = caster_stats(300.0, 0.0);
        let target = MapScope::new();
        let s = scope(&caster, &target, 8.0);
        let shape = resolve_shape(&fireball().effect_scope.shape, &s, &mut cache);
        assert_eq!(
            shape,
            ResolvedShape::Circle {
                center: Vec2::new(8.0, 0.0),
                radius: 3.0
            }
        );
        assert!(shape.contains(Vec2::new(10.0, 1.0)));
        assert!(!shape.contains(Vec2::ZERO));
    }

    #[test]
    fn test_sector_faces_target_by_default() {
        let mut cache = ExpressionCache::new();
        let def: ShapeDef =
            serde_json::from_str(r#"{"type": "sector", "radius": "10", "angle": "90"}"#).unwrap();
        let caster = MapScope::new();
        let target = MapScope::new();
        let mut s = scope(&caster, &target, 5.0);
        s.target_pos = Some(Vec2::new(0.0, 5.0));
        match resolve_shape(&def, &s, &mut cache) {
            ResolvedShape::Sector {
                direction,
                half_angle,
                ..
            } => {
                assert!((direction - PI / 2.0).abs() < 1e-9);
                assert!((half_angle - PI / 4.0).abs() < 1e-9);
            }
            other => panic!("expected sector, got {other:?}"),
        }
    }

    #[test]
    fn test_linear_motion_auto_duration() {
        let mut cache = ExpressionCache::new();
        // 10 units at 0.5 per frame: 20 frames
        let def: ShapeDef = serde_json::from_str(
            r#"{"type": "circle", "radius": "1",
                "operations": [{"type": "motion", "motion": {
                    "kind": "linear", "from": {"type": "caster"},
                    "to": {"type": "point", "x": "10", "y": "0"}, "speed": "0.5"}}]}"#,
        )
        .unwrap();
        let caster = MapScope::new();
        let target = MapScope::new();
        let mut s = scope(&caster, &target, 0.0);

        for (elapsed, x) in [(0, 0.0), (5, 2.5), (10, 5.0), (20, 10.0), (40, 10.0)] {
            s.elapsed = elapsed;
            let center = resolve_shape(&def, &s, &mut cache).center();
            assert!((center.x - x).abs() < 1e-9, "elapsed {elapsed}: {center:?}");
        }
    }

    #[test]
    fn test_follow_motion_tracks_target() {
        let mut cache = ExpressionCache::new();
        let def: ShapeDef = serde_json::from_str(
            r#"{"type": "circle", "radius": "1",
                "operations": [{"type": "motion",
                                "motion": {"kind": "follow", "reference": {"type": "target"}}}]}"#,
        )
        .unwrap();
        let caster = MapScope::new();
        let target = MapScope::new();
        let s = scope(&caster, &target, 7.0);
        assert_eq!(resolve_shape(&def, &s, &mut cache).center(), Vec2::new(7.0, 0.0));
    }

    #[test]
    fn test_validate_descriptor() {
        assert!(validate_descriptor(&fireball()).is_ok());

        let mut broken = fireball();
        broken.mp_cost = "100 +".to_string();
        match validate_descriptor(&broken) {
            Err(SkillError::InvalidExpression { field, .. }) => assert_eq!(field, "mpCost"),
            other => panic!("expected invalid expression, got {other:?}"),
        }

        let mut zero_interval = fireball();
        zero_interval.effect_scope.update_interval = 0;
        assert!(matches!(
            validate_descriptor(&zero_interval),
            Err(SkillError::InvalidDescriptor { .. })
        ));
    }
}
