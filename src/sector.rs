use crate::geometry::{CardGeometry, HIGH_REGION_START};

/// Index range of the primary MAD.
pub const MAD_INDICES: std::ops::Range<u8> = 0..4;
/// Index range of the second MAD on 4K tags.
pub const SECOND_MAD_INDICES: std::ops::RangeInclusive<u8> = 64..=67;

/// What a sector index is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// NDEF payload.
    Data,
    /// Sector trailer: keys and access bits.
    Trailer,
    /// Application directory block.
    Mad,
    /// Trailer of a MAD sector.
    MadTrailer,
    /// Not on this card.
    Skip,
}

impl Role {
    pub fn is_trailer(&self) -> bool {
        matches!(self, Self::Trailer | Self::MadTrailer)
    }

    pub fn is_mad(&self) -> bool {
        matches!(self, Self::Mad | Self::MadTrailer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorDescriptor {
    pub index: u8,
    pub role: Role,
    pub block_count: usize,
}

impl SectorDescriptor {
    pub fn describe(index: u8, geometry: &CardGeometry, ignore_second_mad: bool) -> Self {
        Self {
            index,
            role: classify(index, geometry, ignore_second_mad),
            block_count: geometry.blocks_in_sector(geometry.physical_sector(index)),
        }
    }
}

/// Classifies an index. MAD occupancy wins over the generic trailer test, and the
/// trailer spacing switches at index 128 no matter how big the card is.
pub fn classify(index: u8, geometry: &CardGeometry, ignore_second_mad: bool) -> Role {
    if index as usize >= geometry.sector_count {
        return Role::Skip;
    }
    if MAD_INDICES.contains(&index) {
        return if index == 3 { Role::MadTrailer } else { Role::Mad };
    }
    if geometry.is_four_k() && !ignore_second_mad && SECOND_MAD_INDICES.contains(&index) {
        return if index == 67 { Role::MadTrailer } else { Role::Mad };
    }
    if index < HIGH_REGION_START && index % 4 == 3 {
        return Role::Trailer;
    }
    if index >= HIGH_REGION_START && index % 16 == 15 {
        return Role::Trailer;
    }
    Role::Data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SizeClass;

    #[test]
    fn test_one_k_roles() {
        let geo = CardGeometry::new(SizeClass::OneK);
        for i in geo.indices() {
            let role = classify(i, &geo, false);
            assert_eq!(role.is_trailer(), i % 4 == 3, "index {}", i);
            if !role.is_trailer() {
                assert_eq!(role == Role::Mad, i < 4, "index {}", i);
                assert_eq!(role == Role::Data, i >= 4, "index {}", i);
            }
        }
    }

    #[test]
    fn test_one_k_ignores_second_mad() {
        // 64..=67 are off the end of a 1K tag, whatever the flag says.
        let geo = CardGeometry::new(SizeClass::OneK);
        assert_eq!(classify(64, &geo, false), Role::Skip);
        assert_eq!(classify(62, &geo, false), Role::Data);
        assert_eq!(classify(63, &geo, false), Role::Trailer);
    }

    #[test]
    fn test_four_k_boundary() {
        let geo = CardGeometry::new(SizeClass::FourK);
        for i in geo.indices() {
            let role = classify(i, &geo, true);
            if i < 4 {
                assert!(role.is_mad());
            } else if i < 128 {
                assert_eq!(role == Role::Trailer, i % 4 == 3, "index {}", i);
            } else {
                assert_eq!(role == Role::Trailer, i % 16 == 15, "index {}", i);
            }
        }
        // 131 would be a trailer below the boundary, but isn't above it.
        assert_eq!(classify(131, &geo, false), Role::Data);
        assert_eq!(classify(143, &geo, false), Role::Trailer);
        assert_eq!(classify(255, &geo, false), Role::Trailer);
    }

    #[test]
    fn test_four_k_second_mad() {
        let geo = CardGeometry::new(SizeClass::FourK);
        assert_eq!(classify(63, &geo, false), Role::Trailer);
        assert_eq!(classify(64, &geo, false), Role::Mad);
        assert_eq!(classify(65, &geo, false), Role::Mad);
        assert_eq!(classify(66, &geo, false), Role::Mad);
        assert_eq!(classify(67, &geo, false), Role::MadTrailer);
        assert_eq!(classify(68, &geo, false), Role::Data);

        assert_eq!(classify(64, &geo, true), Role::Data);
        assert_eq!(classify(66, &geo, true), Role::Data);
        assert_eq!(classify(67, &geo, true), Role::Trailer);
    }

    #[test]
    fn test_describe() {
        let geo = CardGeometry::new(SizeClass::FourK);
        assert_eq!(
            SectorDescriptor::describe(200, &geo, false),
            SectorDescriptor {
                index: 200,
                role: Role::Data,
                block_count: 16,
            }
        );
        assert_eq!(SectorDescriptor::describe(7, &geo, false).block_count, 4);
    }
}
