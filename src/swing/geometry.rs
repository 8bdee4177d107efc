//! 2D geometry over normalized landmark coordinates.

/// 点 b における a-b-c の角度（度）
///
/// cos(θ) = (ba · bc) / (|ba| × |bc|)。どちらかのベクトル長が 0 なら 0.0。
pub fn angle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let ba = (a.0 - b.0, a.1 - b.1);
    let bc = (c.0 - b.0, c.1 - b.1);

    let dot = ba.0 * bc.0 + ba.1 * bc.1;
    let mag = (ba.0 * ba.0 + ba.1 * ba.1).sqrt() * (bc.0 * bc.0 + bc.1 * bc.1).sqrt();

    if mag == 0.0 {
        return 0.0;
    }

    (dot / mag).clamp(-1.0, 1.0).acos().to_degrees()
}

/// 前フレームからの変位。前フレームが無ければ 0
pub fn displacement(prev: Option<f64>, current: f64) -> f64 {
    match prev {
        Some(prev) => current - prev,
        None => 0.0,
    }
}

/// 小数点以下 `decimals` 桁に丸める
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    let rounded = (value * scale).round() / scale;
    // -0.0 を 0.0 に揃える
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_straight_arm() {
        let angle = angle((0.0, 0.0), (0.5, 0.0), (1.0, 0.0));
        assert!(approx_eq(angle, 180.0, 1e-9));
    }

    #[test]
    fn test_right_angle() {
        let angle = angle((0.0, 0.0), (0.5, 0.0), (0.5, 0.5));
        assert!(approx_eq(angle, 90.0, 1e-9));
    }

    #[test]
    fn test_folded_arm() {
        let angle = angle((1.0, 0.0), (0.0, 0.0), (2.0, 0.0));
        assert!(approx_eq(angle, 0.0, 1e-9));
    }

    #[test]
    fn test_degenerate_returns_zero() {
        assert_eq!(angle((0.3, 0.3), (0.3, 0.3), (0.9, 0.1)), 0.0);
        assert_eq!(angle((0.1, 0.9), (0.3, 0.3), (0.3, 0.3)), 0.0);
    }

    #[test]
    fn test_angle_symmetric() {
        let a = (0.2, 0.7);
        let b = (0.4, 0.4);
        let c = (0.9, 0.5);
        assert!(approx_eq(angle(a, b, c), angle(c, b, a), 1e-12));
    }

    #[test]
    fn test_displacement() {
        assert_eq!(displacement(None, 0.7), 0.0);
        assert!(approx_eq(displacement(Some(0.5), 0.52), 0.02, 1e-12));
        assert!(approx_eq(displacement(Some(0.5), 0.495), -0.005, 1e-12));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(169.96, 1), 170.0);
        assert_eq!(round_to(123.44, 1), 123.4);
        assert_eq!(round_to(0.012345, 4), 0.0123);
        assert_eq!(round_to(-0.00504, 4), -0.005);
        assert_eq!(round_to(-0.00001, 4), 0.0);
        assert!(round_to(-0.00001, 4).is_sign_positive());
    }
}
