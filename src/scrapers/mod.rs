pub mod embedded;
pub mod finder;
pub mod harvest;
pub mod normalize;
pub mod rightmove;
pub mod traits;
pub mod types;

pub use embedded::EmbeddedDataLocator;
pub use finder::find_record_list;
pub use harvest::{HarvestState, Harvester};
pub use normalize::normalize;
pub use rightmove::RightmoveFetcher;
pub use traits::PageSource;
pub use types::{HarvestConfig, NonSuccessPolicy, PageFetchResult, SortType};
