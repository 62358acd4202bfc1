#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoCibMessage {
    /// "cib", "cib_notify" or "cib_register"
    #[prost(string, tag = "1")]
    pub msg_type: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub operation: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub call_id: i32,
    #[prost(uint32, tag = "4")]
    pub call_options: u32,
    #[prost(string, tag = "5")]
    pub client_id: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub client_name: ::prost::alloc::string::String,
    /// Empty string means unset for all optional strings below.
    #[prost(string, tag = "7")]
    pub section: ::prost::alloc::string::String,
    #[prost(string, tag = "8")]
    pub host: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub origin: ::prost::alloc::string::String,
    #[prost(bool, tag = "10")]
    pub has_rc: bool,
    #[prost(sint32, tag = "11")]
    pub rc: i32,
    /// JSON encoded payload, empty when absent.
    #[prost(bytes = "vec", tag = "12")]
    pub calldata: ::prost::alloc::vec::Vec<u8>,
    /// JSON encoded diff, empty when absent.
    #[prost(bytes = "vec", tag = "13")]
    pub update_diff: ::prost::alloc::vec::Vec<u8>,
    #[prost(bool, tag = "14")]
    pub is_reply: bool,
    #[prost(bool, tag = "15")]
    pub global_update: bool,
    #[prost(string, tag = "16")]
    pub original_operation: ::prost::alloc::string::String,
    #[prost(string, tag = "17")]
    pub delegated_from: ::prost::alloc::string::String,
    #[prost(string, tag = "18")]
    pub notify_event: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoDeliverResult {
    #[prost(oneof = "proto_deliver_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_deliver_result::Result>,
}
/// Nested message and enum types in `ProtoDeliverResult`.
pub mod proto_deliver_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoDeliverSuccess),
        #[prost(message, tag = "2")]
        Err(super::ProtoDeliverError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoDeliverSuccess {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoDeliverError {
    #[prost(oneof = "proto_deliver_error::Err", tags = "1, 2, 3")]
    pub err: ::core::option::Option<proto_deliver_error::Err>,
}
/// Nested message and enum types in `ProtoDeliverError`.
pub mod proto_deliver_error {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Err {
        #[prost(message, tag = "1")]
        ServerFault(super::ProtoServerFault),
        #[prost(message, tag = "2")]
        Malformed(super::ProtoMalformedMessage),
        #[prost(message, tag = "3")]
        NotAuthorized(super::ProtoNotAuthorized),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoCommandResult {
    #[prost(oneof = "proto_command_result::Result", tags = "1, 2, 3")]
    pub result: ::core::option::Option<proto_command_result::Result>,
}
/// Nested message and enum types in `ProtoCommandResult`.
pub mod proto_command_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        /// Present for sync calls.
        #[prost(message, tag = "1")]
        Reply(super::ProtoCibMessage),
        /// Async and discard-reply calls. Async replies arrive on the callback channel.
        #[prost(message, tag = "2")]
        Accepted(super::ProtoCommandAccepted),
        #[prost(message, tag = "3")]
        Err(super::ProtoCommandError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoCommandAccepted {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoCommandError {
    #[prost(oneof = "proto_command_error::Err", tags = "1, 2, 3")]
    pub err: ::core::option::Option<proto_command_error::Err>,
}
/// Nested message and enum types in `ProtoCommandError`.
pub mod proto_command_error {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Err {
        #[prost(message, tag = "1")]
        ServerFault(super::ProtoServerFault),
        #[prost(message, tag = "2")]
        Malformed(super::ProtoMalformedMessage),
        #[prost(message, tag = "3")]
        UnknownClient(super::ProtoUnknownClient),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoCallbackRegistration {
    #[prost(string, tag = "1")]
    pub client_name: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoServerFault {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoMalformedMessage {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoUnknownClient {}
/// The sender is not one of the node's configured peers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNotAuthorized {}
#[doc = r" Generated client implementations."]
pub mod grpc_cib_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    pub struct GrpcCibClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl GrpcCibClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> GrpcCibClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        #[doc = " Cluster-internal delivery of a message from one node to another. Diffs, full replaces and"]
        #[doc = " resync requests all travel through here."]
        pub async fn deliver(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoCibMessage>,
        ) -> Result<tonic::Response<super::ProtoDeliverResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/cib.GrpcCib/Deliver");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " Client command channel."]
        pub async fn command(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoCibMessage>,
        ) -> Result<tonic::Response<super::ProtoCommandResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/cib.GrpcCib/Command");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " Client callback channel. The first message on the stream carries the client's token."]
        pub async fn callbacks(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoCallbackRegistration>,
        ) -> Result<tonic::Response<tonic::codec::Streaming<super::ProtoCibMessage>>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/cib.GrpcCib/Callbacks");
            self.inner
                .server_streaming(request.into_request(), path, codec)
                .await
        }
    }
    impl<T: Clone> Clone for GrpcCibClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for GrpcCibClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "GrpcCibClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod grpc_cib_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with GrpcCibServer."]
    #[async_trait]
    pub trait GrpcCib: Send + Sync + 'static {
        #[doc = " Cluster-internal delivery of a message from one node to another. Diffs, full replaces and"]
        #[doc = " resync requests all travel through here."]
        async fn deliver(
            &self,
            request: tonic::Request<super::ProtoCibMessage>,
        ) -> Result<tonic::Response<super::ProtoDeliverResult>, tonic::Status>;
        #[doc = " Client command channel."]
        async fn command(
            &self,
            request: tonic::Request<super::ProtoCibMessage>,
        ) -> Result<tonic::Response<super::ProtoCommandResult>, tonic::Status>;
        #[doc = "Server streaming response type for the Callbacks method."]
        type CallbacksStream: futures_core::Stream<Item = Result<super::ProtoCibMessage, tonic::Status>>
            + Send
            + Sync
            + 'static;
        #[doc = " Client callback channel. The first message on the stream carries the client's token."]
        async fn callbacks(
            &self,
            request: tonic::Request<super::ProtoCallbackRegistration>,
        ) -> Result<tonic::Response<Self::CallbacksStream>, tonic::Status>;
    }
    #[derive(Debug)]
    pub struct GrpcCibServer<T: GrpcCib> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: GrpcCib> GrpcCibServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for GrpcCibServer<T>
    where
        T: GrpcCib,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/cib.GrpcCib/Deliver" => {
                    #[allow(non_camel_case_types)]
                    struct DeliverSvc<T: GrpcCib>(pub Arc<T>);
                    impl<T: GrpcCib> tonic::server::UnaryService<super::ProtoCibMessage> for DeliverSvc<T> {
                        type Response = super::ProtoDeliverResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoCibMessage>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).deliver(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = DeliverSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/cib.GrpcCib/Command" => {
                    #[allow(non_camel_case_types)]
                    struct CommandSvc<T: GrpcCib>(pub Arc<T>);
                    impl<T: GrpcCib> tonic::server::UnaryService<super::ProtoCibMessage> for CommandSvc<T> {
                        type Response = super::ProtoCommandResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoCibMessage>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).command(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = CommandSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/cib.GrpcCib/Callbacks" => {
                    #[allow(non_camel_case_types)]
                    struct CallbacksSvc<T: GrpcCib>(pub Arc<T>);
                    impl<T: GrpcCib>
                        tonic::server::ServerStreamingService<super::ProtoCallbackRegistration>
                        for CallbacksSvc<T>
                    {
                        type Response = super::ProtoCibMessage;
                        type ResponseStream = T::CallbacksStream;
                        type Future =
                            BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoCallbackRegistration>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).callbacks(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1;
                        let inner = inner.0;
                        let method = CallbacksSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.server_streaming(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: GrpcCib> Clone for GrpcCibServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: GrpcCib> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: GrpcCib> tonic::transport::NamedService for GrpcCibServer<T> {
        const NAME: &'static str = "cib.GrpcCib";
    }
}
