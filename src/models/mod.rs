pub mod donor_location;
pub mod donor_search;

pub use donor_location::{BloodGroup, DonorLocation, DonorReference, LocationRecord};
pub use donor_search::{
    DonorSearchOutcome, DonorSearchRequest, EligibleDonor, SearchAction, SearchKey,
    SearchProgress, SearchState,
};
