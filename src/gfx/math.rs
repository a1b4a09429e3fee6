//! Left-handed matrix helpers on top of cgmath.
//!
//! cgmath builds right-handed, OpenGL-style matrices. The renderer works in a
//! left-handed world (+Z into the screen) with a [0, 1] clip depth range, so
//! view and projection matrices are built here instead.

use cgmath::{InnerSpace, Matrix4, Point3, Quaternion, Rad, Rotation3, Vector3};

/// View matrix looking from `eye` along `direction`.
///
/// `direction` does not need to be normalized. The result maps `eye` to the
/// origin and `direction` to +Z.
pub fn look_to_lh(eye: Point3<f32>, direction: Vector3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
    let z = direction.normalize();
    let x = up.cross(z).normalize();
    let y = z.cross(x);
    let eye = Vector3::new(eye.x, eye.y, eye.z);

    #[rustfmt::skip]
    let view = Matrix4::new(
        x.x, y.x, z.x, 0.0,
        x.y, y.y, z.y, 0.0,
        x.z, y.z, z.z, 0.0,
        -x.dot(eye), -y.dot(eye), -z.dot(eye), 1.0,
    );
    view
}

/// Perspective projection with a vertical field of view, mapping view depth
/// `near..far` to clip depth `0..1`.
pub fn perspective_fov_lh(fov_y: Rad<f32>, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
    let h = 1.0 / (fov_y.0 * 0.5).tan();
    let w = h / aspect;
    let range = far / (far - near);

    #[rustfmt::skip]
    let proj = Matrix4::new(
        w,   0.0, 0.0,            0.0,
        0.0, h,   0.0,            0.0,
        0.0, 0.0, range,          1.0,
        0.0, 0.0, -range * near,  0.0,
    );
    proj
}

/// Orthographic projection of a `width` x `height` box centered on the view axis.
pub fn orthographic_lh(width: f32, height: f32, near: f32, far: f32) -> Matrix4<f32> {
    let range = 1.0 / (far - near);

    #[rustfmt::skip]
    let proj = Matrix4::new(
        2.0 / width, 0.0,          0.0,            0.0,
        0.0,         2.0 / height, 0.0,            0.0,
        0.0,         0.0,          range,          0.0,
        0.0,         0.0,          -range * near,  1.0,
    );
    proj
}

/// Orientation from Euler angles in radians: `x` pitch, `y` yaw, `z` roll.
///
/// Roll is applied first, then pitch, then yaw.
pub fn quaternion_from_euler(rotation: Vector3<f32>) -> Quaternion<f32> {
    Quaternion::from_angle_y(Rad(rotation.y))
        * Quaternion::from_angle_x(Rad(rotation.x))
        * Quaternion::from_angle_z(Rad(rotation.z))
}

#[cfg(test)]
pub(crate) fn assert_vec3_near(actual: Vector3<f32>, expected: Vector3<f32>) {
    let diff = actual - expected;
    assert!(
        diff.magnitude() < 1e-4,
        "expected {expected:?}, got {actual:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Rotation, Vector4};

    #[test]
    fn test_look_to_maps_eye_to_origin() {
        let eye = Point3::new(0.0, 0.0, -5.0);
        let view = look_to_lh(eye, Vector3::unit_z(), Vector3::unit_y());

        let origin = view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_vec3_near(origin.truncate(), Vector3::new(0.0, 0.0, 5.0));

        let at_eye = view * Vector4::new(0.0, 0.0, -5.0, 1.0);
        assert_vec3_near(at_eye.truncate(), Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_look_to_keeps_right_handedness_of_screen() {
        // Looking down +Z with +Y up, +X must stay on the right.
        let view = look_to_lh(Point3::new(0.0, 0.0, 0.0), Vector3::unit_z(), Vector3::unit_y());
        let right = view * Vector4::new(1.0, 0.0, 1.0, 1.0);
        assert!(right.x > 0.0);
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = perspective_fov_lh(Deg(45.0).into(), 1.0, 0.1, 100.0);

        let near = proj * Vector4::new(0.0, 0.0, 0.1, 1.0);
        let far = proj * Vector4::new(0.0, 0.0, 100.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_orthographic_depth_range() {
        let proj = orthographic_lh(20.0, 20.0, 0.1, 50.0);

        let near = proj * Vector4::new(10.0, -10.0, 0.1, 1.0);
        let far = proj * Vector4::new(0.0, 0.0, 50.0, 1.0);
        assert!((near.x - 1.0).abs() < 1e-5);
        assert!((near.y + 1.0).abs() < 1e-5);
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_yaw_turns_forward_towards_positive_x() {
        let q = quaternion_from_euler(Vector3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));
        assert_vec3_near(q.rotate_vector(Vector3::unit_z()), Vector3::unit_x());
    }

    #[test]
    fn test_positive_pitch_looks_down() {
        let q = quaternion_from_euler(Vector3::new(0.3, 0.0, 0.0));
        assert!(q.rotate_vector(Vector3::unit_z()).y < 0.0);
    }
}
