//! Generated gRPC types and service traits for the social-network service.
//! See `protos/sns.proto` for the wire contract.

pub mod proto {
    tonic::include_proto!("sns");
}
