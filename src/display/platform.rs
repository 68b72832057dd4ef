// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Platform classification drives which scan-out strategy `runtime` picks.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Rpi,
    Amlogic,
    Generic,
}

impl Platform {
    pub fn from_driver_name(name: &str) -> Self {
        match name {
            "vc4" | "v3d" => Platform::Rpi,
            "meson" => Platform::Amlogic,
            _ => Platform::Generic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_drivers() {
        assert_eq!(Platform::from_driver_name("vc4"), Platform::Rpi);
        assert_eq!(Platform::from_driver_name("meson"), Platform::Amlogic);
        assert_eq!(Platform::from_driver_name("amdgpu"), Platform::Generic);
    }
}
