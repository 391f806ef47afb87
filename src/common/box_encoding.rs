/// Layout of the four numbers describing one box in an NMS request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BoxEncoding {
    /// `(cx, cy, w, h)`
    #[default] CenterExtent,
    /// `(x, y, w, h)`
    CornerExtent,
    /// `(x1, y1, x2, y2)`
    CornerCorner,
}

// Selector values as they appear on the wire.
const CENTER_EXTENT: u32 = 0;
const CORNER_EXTENT: u32 = 1;
const CORNER_CORNER: u32 = 2;

/// Flag bit in the wire selector asking for the source row index in every result entry.
pub const WITH_INDEX_FLAG: u32 = 0x100;
/// Flag bit in the wire selector taking boxes and scores from two engine
/// outputs instead of the request payload.
pub const FROM_OUTPUTS_FLAG: u32 = 0x200;

impl BoxEncoding {
    pub fn from_selector(selector: u32) -> Option<Self> {
        match selector & !(WITH_INDEX_FLAG | FROM_OUTPUTS_FLAG) {
            CENTER_EXTENT => Some(BoxEncoding::CenterExtent),
            CORNER_EXTENT => Some(BoxEncoding::CornerExtent),
            CORNER_CORNER => Some(BoxEncoding::CornerCorner),
            _ => None,
        }
    }

    pub fn selector(&self) -> u32 {
        match self {
            BoxEncoding::CenterExtent => CENTER_EXTENT,
            BoxEncoding::CornerExtent => CORNER_EXTENT,
            BoxEncoding::CornerCorner => CORNER_CORNER,
        }
    }
}
